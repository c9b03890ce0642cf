use scraper::Html;

/// Converts an HTML fragment to Markdown
///
/// Falls back to the fragment's plain text if conversion fails.
pub fn html_to_markdown(html: &str) -> String {
    match htmd::convert(html) {
        Ok(markdown) => collapse_blank_lines(markdown.trim()),
        Err(e) => {
            tracing::debug!("Markdown conversion failed, using plain text: {}", e);
            let fragment = Html::parse_fragment(html);
            fragment
                .root_element()
                .text()
                .collect::<String>()
                .trim()
                .to_string()
        }
    }
}

/// Collapses runs of blank lines into a single blank line
fn collapse_blank_lines(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;

    for line in markdown.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out.trim_end().to_string()
}
