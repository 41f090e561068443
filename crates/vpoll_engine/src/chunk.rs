use scraper::{Html, Selector};

/// Returns the `src` of the first `<script>` whose `src` contains
/// `chunk_name`, ignoring ASCII case.
///
/// The document is parsed as HTML, so tag and attribute case, quoting style
/// and attributes spread over several lines do not matter.
pub fn extract_chunk(html: &str, chunk_name: &str) -> Option<String> {
    let selector = Selector::parse("script[src]").ok()?;
    let needle = chunk_name.to_ascii_lowercase();
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|script| script.value().attr("src"))
        .find(|src| src.to_ascii_lowercase().contains(&needle))
        .map(str::to_string)
}
