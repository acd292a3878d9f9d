//! BODYSTRUCTURE / BODY rendering (C5) and MIME part-path addressing.

use crate::message::MimeNode;

/// A dotted MIME section path like `2.1`, already split into components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePartPath(pub Vec<u32>);

impl MimePartPath {
    pub fn parse(section: &str) -> Option<MimePartPath> {
        if section.is_empty() {
            return Some(MimePartPath(Vec::new()));
        }
        let mut parts = Vec::new();
        for piece in section.split('.') {
            parts.push(piece.parse::<u32>().ok()?);
        }
        Some(MimePartPath(parts))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyStructure(String);

impl BodyStructure {
    /// `extensible`: BODYSTRUCTURE includes disposition/language/location;
    /// plain BODY omits them (spec §4.5: "BODY is the non-extensible form").
    pub fn render(node: &MimeNode, extensible: bool) -> BodyStructure {
        BodyStructure(render_node(node, extensible))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn nstring(value: &str) -> String {
    format!("{value:?}")
}

fn opt_nstring(value: &Option<String>) -> String {
    match value {
        Some(v) => nstring(v),
        None => "NIL".to_owned(),
    }
}

fn param_list(params: &[(String, String)]) -> String {
    if params.is_empty() {
        return "NIL".to_owned();
    }
    let rendered: Vec<String> = params
        .iter()
        .flat_map(|(k, v)| [nstring(k), nstring(v)])
        .collect();
    format!("({})", rendered.join(" "))
}

fn render_node(node: &MimeNode, extensible: bool) -> String {
    if node.is_multipart() {
        let children: Vec<String> = node
            .children
            .iter()
            .map(|child| render_node(child, extensible))
            .collect();
        let mut out = format!("({}{})", children.join(""), nstring(&node.content_subtype));
        if extensible {
            out = format!(
                "({}{} {} {} {} {})",
                children.join(""),
                nstring(&node.content_subtype),
                param_list(&node.params),
                render_disposition(node),
                render_language(node),
                opt_nstring(&node.location),
            );
        }
        return out;
    }

    let base = format!(
        "({} {} {} {} {} {} {}",
        nstring(&node.content_type),
        nstring(&node.content_subtype),
        param_list(&node.params),
        opt_nstring(&node.content_id),
        opt_nstring(&node.description),
        nstring(&node.encoding),
        node.size_octets,
    );

    let with_lines = if node.content_type.eq_ignore_ascii_case("text") {
        format!("{base} {})", node.line_count.unwrap_or(0))
    } else {
        format!("{base})")
    };

    if !extensible {
        return with_lines;
    }

    // Extensible form: drop trailing ')' and append the extension fields.
    let trimmed = with_lines.trim_end_matches(')');
    format!(
        "{trimmed} {} {})",
        render_disposition(node),
        render_language(node)
    )
}

fn render_disposition(node: &MimeNode) -> String {
    match &node.disposition {
        Some((kind, params)) => format!("({} {})", nstring(kind), param_list(params)),
        None => "NIL".to_owned(),
    }
}

fn render_language(node: &MimeNode) -> String {
    match &node.language {
        Some(langs) if !langs.is_empty() => {
            let rendered: Vec<String> = langs.iter().map(|l| nstring(l)).collect();
            format!("({})", rendered.join(" "))
        }
        _ => "NIL".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn leaf_body_has_seven_elements() {
        let raw = b"Subject: hi\r\n\r\nhello\r\n".to_vec();
        let message = Message::parse(raw).unwrap();
        let rendered = BodyStructure::render(&message.root, false);
        assert!(rendered.as_str().starts_with("(\"text\" \"plain\""));
    }

    #[test]
    fn numeric_path_finds_nested_part() {
        let path = MimePartPath::parse("2.1").unwrap();
        assert_eq!(path.0, vec![2, 1]);
    }
}
