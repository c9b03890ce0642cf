use scraper::{Html, Selector};
use serde::Serialize;

/// Number of sample links and images reported
const SAMPLE_SIZE: usize = 10;

/// Structural overview of a page, used to hand-build extraction schemas
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructureAnalysis {
    /// Heading tag names in document order (`h1`, `h2`, ...)
    pub headings: Vec<String>,
    pub sample_links: Vec<String>,
    pub sample_images: Vec<String>,
    /// `action` of every form; empty when a form has none
    pub form_actions: Vec<String>,
    pub tables: usize,
    pub lists: usize,
    pub suggestions: Vec<SelectorSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorSuggestion {
    pub name: String,
    pub selector: String,
    pub description: String,
    pub confidence: f32,
}

/// Analyzes page structure and suggests selectors for common fields
pub fn analyze_structure(html: &str) -> StructureAnalysis {
    let document = Html::parse_document(html);
    let mut analysis = StructureAnalysis::default();

    if let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") {
        analysis.headings = document
            .select(&selector)
            .map(|el| el.value().name().to_string())
            .collect();
    }

    analysis.sample_links = sample_attr(&document, "a[href]", "href");
    analysis.sample_images = sample_attr(&document, "img[src]", "src");

    if let Ok(selector) = Selector::parse("form") {
        analysis.form_actions = document
            .select(&selector)
            .map(|el| el.value().attr("action").unwrap_or_default().to_string())
            .collect();
    }

    analysis.tables = count(&document, "table");
    analysis.lists = count(&document, "ul, ol");

    if count(&document, "h1") > 0 {
        analysis.suggestions.push(SelectorSuggestion {
            name: "main_title".to_string(),
            selector: "h1".to_string(),
            description: "Main page title".to_string(),
            confidence: 0.9,
        });
    }

    if let Some(selector) = ["article", ".content", "#content", "main"]
        .into_iter()
        .find(|s| count(&document, s) > 0)
    {
        analysis.suggestions.push(SelectorSuggestion {
            name: "main_content".to_string(),
            selector: selector.to_string(),
            description: "Main content area".to_string(),
            confidence: 0.8,
        });
    }

    analysis
}

fn sample_attr(document: &Html, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .take(SAMPLE_SIZE)
        .map(str::to_string)
        .collect()
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_structure() {
        let html = r#"<html><body>
            <h1>Title</h1><h2>Sub</h2><h2>Sub 2</h2>
            <div id="content"><ul><li>a</li></ul><ol><li>b</li></ol></div>
            <table></table>
            <form action="/search"></form><form></form>
            <img src="/a.png">
            <a href="/x">x</a>
        </body></html>"#;

        let analysis = analyze_structure(html);

        assert_eq!(analysis.headings, vec!["h1", "h2", "h2"]);
        assert_eq!(analysis.sample_links, vec!["/x"]);
        assert_eq!(analysis.sample_images, vec!["/a.png"]);
        assert_eq!(analysis.form_actions, vec!["/search", ""]);
        assert_eq!(analysis.tables, 1);
        assert_eq!(analysis.lists, 2);

        assert_eq!(analysis.suggestions.len(), 2);
        assert_eq!(analysis.suggestions[0].name, "main_title");
        assert_eq!(analysis.suggestions[1].selector, "#content");
    }

    #[test]
    fn test_samples_are_capped() {
        let links: String = (0..25).map(|i| format!(r#"<a href="/{}">l</a>"#, i)).collect();
        let analysis = analyze_structure(&format!("<html><body>{}</body></html>", links));

        assert_eq!(analysis.sample_links.len(), SAMPLE_SIZE);
        assert!(analysis.suggestions.is_empty());
    }
}
