/// Clean post HTML using the ammonia library.
///
/// Whitelist-based: keeps the formatting tags the editor produces (plus
/// `<figure>`/`<figcaption>` for captioned images) and strips scripts, frames
/// and event-handler attributes. Links get `rel="noopener noreferrer"`.
///
/// Comments are plain text and are not passed through here; clients must
/// render them as text.
pub fn clean_html(input: &str) -> String {
    ammonia::Builder::default()
        .add_tags(&["figure", "figcaption"])
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::clean_html;

    #[test]
    fn strips_scripts_and_handlers() {
        let cleaned = clean_html(r#"<p onclick="x()">hi</p><script>alert(1)</script>"#);
        assert_eq!(cleaned, "<p>hi</p>");
    }

    #[test]
    fn keeps_captioned_images() {
        let cleaned = clean_html(r#"<figure><img src="https://a.test/x.png"><figcaption>x</figcaption></figure>"#);
        assert!(cleaned.contains("<figure>"));
        assert!(cleaned.contains("<figcaption>x</figcaption>"));
    }
}
