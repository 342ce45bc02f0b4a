//! Server-rendered HTML for the credential form.
//!
//! Templates live under `templates/` and are HTML-escaped by askama.

use askama::Template;

const RENDER_FAILED: &str = "<!DOCTYPE html><title>CoPri</title><p>Page could not be rendered.</p>";

#[derive(Template)]
#[template(path = "token_form.html")]
struct TokenFormPage<'a> {
    staged: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "token_staged.html")]
struct TokenStagedPage<'a> {
    masked: &'a str,
    prefix_warning: bool,
}

#[derive(Template)]
#[template(path = "token_error.html")]
struct TokenErrorPage<'a> {
    message: &'a str,
}

fn render<T: Template>(page: &T) -> String {
    page.render().unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to render page");
        RENDER_FAILED.to_string()
    })
}

/// The token submission form. `staged` shows the masked value already in the slot.
pub fn token_form(staged: Option<&str>) -> String {
    render(&TokenFormPage { staged })
}

/// Confirmation after a token was staged. Only the masked value is echoed.
pub fn token_staged(masked: &str, prefix_warning: bool) -> String {
    render(&TokenStagedPage {
        masked,
        prefix_warning,
    })
}

pub fn token_error(message: &str) -> String {
    render(&TokenErrorPage { message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_posts_pat_field() {
        let html = token_form(None);
        assert!(html.contains("name=\"pat\""));
        assert!(html.contains("method=\"post\""));
        assert!(html.contains("type=\"password\""));
        assert!(html.contains("No token is staged"));
        assert!(html.contains("<title>Submit GitHub token · CoPri</title>"));
    }

    #[test]
    fn test_form_shows_masked_staged_value() {
        let html = token_form(Some("******c123"));
        assert!(html.contains("<code>******c123</code>"));
        assert!(!html.contains("No token is staged"));
    }

    #[test]
    fn test_staged_page_echoes_only_masked_value() {
        let html = token_staged("******c123", false);
        assert!(html.contains("******c123"));
        assert!(!html.contains("ghp_abc123"));
        assert!(!html.contains("does not look like"));
    }

    #[test]
    fn test_staged_page_warns_on_unknown_prefix() {
        assert!(token_staged("***", true).contains("does not look like a GitHub token"));
    }

    #[test]
    fn test_staged_page_escapes_masked_value() {
        let html = token_staged("**<img src=x>", false);
        assert!(html.contains("&lt;img"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = token_error("<b>bad</b>");
        assert!(html.contains("&lt;b&gt;bad"));
        assert!(!html.contains("<b>bad"));
    }
}
