pub const RECONSTRUCT_DEFAULT: &str = include_str!("../data/prompts/reconstruct_default.txt");
pub const RECONSTRUCT_CONTEXT: &str = include_str!("../data/prompts/reconstruct_context.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Builds the text sent to every provider for one request.
///
/// The caller's prompt is inserted last so placeholder-like text inside it
/// reaches the provider verbatim.
pub fn provider_prompt(prompt: &str, fragment_count: usize) -> String {
    let template = render(
        RECONSTRUCT_CONTEXT,
        &[("fragment_count", &fragment_count.to_string())],
    );
    render(&template, &[("prompt", prompt)])
}
