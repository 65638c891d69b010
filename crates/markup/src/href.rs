use crate::consts::PROTOCOL_RELATIVE;

/// Maps a stylesheet `href` to the name the build knows the stylesheet by.
///
/// The configured public path is stripped first, then any query string or
/// fragment, then leading `/` and `./` segments. Backslashes become forward
/// slashes. Hrefs pointing at another origin (`https://`, `//cdn`, `data:`)
/// are not build outputs and map to `None`.
///
/// ```
/// use fold_markup::asset_name;
///
/// assert_eq!(asset_name("/static/css/main.css?v=3", "/static/").as_deref(), Some("css/main.css"));
/// assert_eq!(asset_name("https://cdn.example.com/x.css", ""), None);
/// ```
pub fn asset_name(href: &str, public_path: &str) -> Option<String> {
    let mut href = href.trim();
    if !public_path.is_empty()
        && let Some(stripped) = href.strip_prefix(public_path)
    {
        href = stripped;
    }
    if is_external(href) {
        return None;
    }
    let path = href.split(['?', '#']).next().unwrap_or_default().replace('\\', "/");
    let mut name = path.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    (!name.is_empty()).then(|| name.to_string())
}

fn is_external(href: &str) -> bool {
    if href.starts_with(PROTOCOL_RELATIVE) {
        return true;
    }
    // RFC 3986: scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
