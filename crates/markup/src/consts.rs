/// Candidate elements; `rel` is checked token-wise in the handler since it is
/// a case-insensitive, space-separated list.
pub(crate) const LINK_SELECTOR: &str = "link[href]";
pub(crate) const STYLESHEET_REL: &str = "stylesheet";
/// Protocol-relative hrefs point at another host.
pub(crate) const PROTOCOL_RELATIVE: &str = "//";
