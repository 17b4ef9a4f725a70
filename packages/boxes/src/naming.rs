// ABOUTME: Mapping between user-facing names and namespaced runtime resource names
// ABOUTME: Used to separate vbox containers and images from everything else on the host

use vbox_config::constants::{NAMESPACE, NAMESPACE_SEPARATOR};

fn prefix() -> String {
    format!("{}{}", NAMESPACE, NAMESPACE_SEPARATOR)
}

/// `dev` -> `vbox-dev`
pub fn namespaced(name: &str) -> String {
    format!("{}{}", prefix(), name)
}

/// Whether a runtime name belongs to vbox. Docker reports container names with a leading `/`.
pub fn is_ours(runtime_name: &str) -> bool {
    let trimmed = runtime_name.trim_start_matches('/');
    trimmed.len() > prefix().len() && trimmed.starts_with(&prefix())
}

/// Inverse of [`namespaced`]. Names that are not ours come back trimmed but otherwise untouched.
pub fn unqualify(runtime_name: &str) -> String {
    let trimmed = runtime_name.trim_start_matches('/');
    trimmed
        .strip_prefix(&prefix())
        .unwrap_or(trimmed)
        .to_string()
}

/// Tag for a vbox image: `vbox-<name>:<version>`
pub fn image_tag(name: &str, version: &str) -> String {
    format!("{}:{}", namespaced(name), version)
}

/// Split a `vbox-<name>:<version>` tag back into its parts.
pub fn parse_image_tag(tag: &str) -> Option<(String, String)> {
    if !is_ours(tag) {
        return None;
    }
    let mut parts = tag.split(':');
    let (repo, version) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || version.is_empty() {
        return None;
    }
    Some((unqualify(repo), version.to_string()))
}

/// Box names end up as container names, SSH aliases and key file names.
pub fn is_valid_box_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("dev")]
    #[case("web-server")]
    #[case("vbox-nested")]
    #[case("a.b_c")]
    fn test_namespace_round_trip(#[case] name: &str) {
        let qualified = namespaced(name);
        assert!(is_ours(&qualified));
        assert_eq!(namespaced(&unqualify(&qualified)), qualified);
    }

    #[test]
    fn test_is_ours_filters_foreign_names() {
        assert!(is_ours("/vbox-dev"));
        assert!(is_ours("vbox-dev:1.0"));
        assert!(!is_ours("/postgres"));
        assert!(!is_ours("vboxdev"));
        assert!(!is_ours("vbox-"));
    }

    #[test]
    fn test_unqualify_strips_slash_and_prefix() {
        assert_eq!(unqualify("/vbox-dev"), "dev");
        assert_eq!(unqualify("/postgres"), "postgres");
    }

    #[test]
    fn test_image_tag_parsing() {
        assert_eq!(image_tag("base", "1.0"), "vbox-base:1.0");
        assert_eq!(
            parse_image_tag("vbox-base:1.0"),
            Some(("base".to_string(), "1.0".to_string()))
        );
        assert_eq!(parse_image_tag("ubuntu:22.04"), None);
        assert_eq!(parse_image_tag("vbox-base"), None);
        assert_eq!(parse_image_tag("localhost:5000/vbox-base:1.0"), None);
    }

    #[rstest]
    #[case("dev", true)]
    #[case("my_box.1-a", true)]
    #[case("", false)]
    #[case("-dev", false)]
    #[case("dev box", false)]
    #[case("../etc", false)]
    fn test_box_name_validation(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_box_name(name), valid);
    }
}
