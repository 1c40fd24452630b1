//! Lecture tolérante des descriptions XML.
//!
//! Beaucoup de devices servent un XML approximatif : BOM, préambule, préfixes
//! non déclarés, `&` nus, balises jamais fermées, voire du HTML. Chaque
//! stratégie est une fonction pure `octets → arbre` ; elles sont essayées dans
//! l'ordre jusqu'à ce que l'une produise un arbre.

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, trace};
use xmltree::{Element, XMLNode};

type Strategy = fn(&[u8]) -> Option<Element>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("strict", parse_strict),
    ("sanitized", parse_sanitized),
    ("repaired", parse_repaired),
    ("lenient", parse_lenient),
    ("root-block", parse_root_block),
    ("html", parse_html),
];

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\?xml[^>]*\?>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]+>").unwrap());
static XMLNS_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s+xmlns(?::[\w.-]+)?\s*=\s*(?:"[^"]*"|'[^']*')"#).unwrap()
});
static TAG_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<(/?)[\w.-]+:").unwrap());
static ATTR_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\s)[\w.-]+:([\w.-]+\s*=)").unwrap());
static ELEMENT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([A-Za-z_][\w.:-]*)([^<>]*)>").unwrap());
static ROOT_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:[\w.-]+:)?root[\s>/]").unwrap());
static ROOT_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:[\w.-]+:)?root\s*>").unwrap());
static DEVICE_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:[\w.-]+:)?device[\s>/]").unwrap());
static DEVICE_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:[\w.-]+:)?device\s*>").unwrap());

/// Essaie chaque stratégie dans l'ordre ; `None` si aucune ne donne d'arbre.
pub fn parse_tree(data: &[u8]) -> Option<Element> {
    for (name, strategy) in STRATEGIES {
        if let Some(root) = strategy(data) {
            debug!("Description parsed with '{}' strategy", name);
            return Some(root);
        }
        trace!("Strategy '{}' failed", name);
    }
    None
}

/// Parseur XML strict, sans aucune réparation.
pub fn parse_strict(data: &[u8]) -> Option<Element> {
    Element::parse(data).ok()
}

fn parse_sanitized(data: &[u8]) -> Option<Element> {
    let text = sanitize(&String::from_utf8_lossy(data));
    if text.is_empty() {
        return None;
    }
    parse_strict(strip_namespaces(&text).as_bytes())
}

fn parse_repaired(data: &[u8]) -> Option<Element> {
    let text = sanitize(&String::from_utf8_lossy(data));
    if text.is_empty() {
        return None;
    }
    parse_strict(repair(&strip_namespaces(&text)).as_bytes())
}

fn parse_lenient(data: &[u8]) -> Option<Element> {
    let text = sanitize(&String::from_utf8_lossy(data));
    if text.is_empty() {
        return None;
    }
    build_lenient_tree(&text)
}

fn parse_root_block(data: &[u8]) -> Option<Element> {
    let text = sanitize(&String::from_utf8_lossy(data));
    let block = extract_block(&text, &ROOT_OPEN_RE, &ROOT_CLOSE_RE)
        .or_else(|| extract_block(&text, &DEVICE_OPEN_RE, &DEVICE_CLOSE_RE))?;

    let block = strip_namespaces(block);
    parse_strict(repair(&block).as_bytes()).or_else(|| build_lenient_tree(&block))
}

fn parse_html(data: &[u8]) -> Option<Element> {
    let text = String::from_utf8_lossy(data);
    let document = Html::parse_document(&text);
    let selector = Selector::parse("body > *").ok()?;
    let first = document.select(&selector).next()?;

    let mut xml = String::from(XML_DECLARATION);
    serialize_html_element(first, &mut xml);
    parse_strict(xml.as_bytes())
}

/// Nettoie le texte : BOM, caractères de contrôle, préambule, déclarations
/// multiples. Retourne une chaîne vide s'il n'y a aucune balise.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\u{feff}' && (!c.is_control() || matches!(c, '\t' | '\n' | '\r')))
        .collect();
    let cleaned = DECLARATION_RE.replace_all(&cleaned, "");

    let (Some(start), Some(end)) = (cleaned.find('<'), cleaned.rfind('>')) else {
        return String::new();
    };
    if end < start {
        return String::new();
    }

    format!("{}{}", XML_DECLARATION, &cleaned[start..=end])
}

/// Retire les déclarations `xmlns` et les préfixes des balises et attributs.
pub fn strip_namespaces(text: &str) -> String {
    TAG_RE
        .replace_all(text, |caps: &Captures| {
            let tag = &caps[0];
            if tag.starts_with("<?") || tag.starts_with("<!") {
                return tag.to_string();
            }
            let tag = XMLNS_ATTR_RE.replace_all(tag, "");
            let tag = TAG_PREFIX_RE.replace(&tag, "<$1");
            ATTR_PREFIX_RE.replace_all(&tag, "$1$2").into_owned()
        })
        .into_owned()
}

/// Échappe les `&` nus puis ferme les balises restées ouvertes.
pub fn repair(text: &str) -> String {
    close_unterminated_tags(&escape_bare_ampersands(text))
}

fn escape_bare_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '&' && !is_entity_reference(&text[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

fn is_entity_reference(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let name = &rest[..end];
    if name.is_empty() || name.len() > 10 {
        return false;
    }

    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(dec) = name.strip_prefix('#') {
        !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit())
    } else {
        name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

/// Insère les fermetures manquantes : avant la fermeture d'un ancêtre, ou en
/// fin de document. Les fermetures orphelines sont supprimées.
fn close_unterminated_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in ELEMENT_TAG_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let name = &caps[2];
        let closing = &caps[1] == "/";
        let self_closing = caps[3].trim_end().ends_with('/');

        if closing {
            match stack.iter().rposition(|open| open == name) {
                Some(pos) => {
                    for unterminated in stack.drain(pos + 1..).rev() {
                        trace!("Closing unterminated <{}>", unterminated);
                        out.push_str(&format!("</{}>", unterminated));
                    }
                    stack.pop();
                    out.push_str(whole.as_str());
                }
                None => trace!("Dropping stray </{}>", name),
            }
        } else {
            if !self_closing {
                stack.push(name.to_string());
            }
            out.push_str(whole.as_str());
        }
    }

    out.push_str(&text[last..]);
    for unterminated in stack.into_iter().rev() {
        out.push_str(&format!("</{}>", unterminated));
    }
    out
}

/// Constructeur d'arbre qui accepte les fermetures mal appariées et s'arrête
/// proprement à la première erreur.
fn build_lenient_tree(text: &str) -> Option<Element> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::new(&local_name(e.local_name().as_ref()))),
            Ok(Event::Empty(e)) => {
                let element = Element::new(&local_name(e.local_name().as_ref()));
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref());
                if let Some(pos) = stack.iter().rposition(|el| el.name == name) {
                    while stack.len() > pos {
                        if let Some(element) = stack.pop() {
                            attach(&mut stack, &mut root, element);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => push_text(&mut stack, &String::from_utf8_lossy(&e)),
            Ok(Event::CData(e)) => push_text(&mut stack, &String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) => {
                if let Some(c) = resolve_entity(&String::from_utf8_lossy(&e)) {
                    push_text(&mut stack, c.encode_utf8(&mut [0u8; 4]));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Lenient parser stopped at byte {}: {}", reader.buffer_position(), e);
                break;
            }
        }

        if root.is_some() && stack.is_empty() {
            break;
        }
    }

    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }
    root
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XMLNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(XMLNode::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(XMLNode::Text(text.to_string()));
    }
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Premier bloc `<tag ...> ... </tag>` : de la première ouverture à la dernière fermeture.
fn extract_block<'a>(text: &'a str, open: &Regex, close: &Regex) -> Option<&'a str> {
    let start = open.find(text)?.start();
    let end = close.find_iter(&text[start..]).last()?.end() + start;
    Some(&text[start..end])
}

/// Re-sérialise un élément HTML en XML minimal : noms sans préfixe, texte
/// échappé, attributs ignorés.
fn serialize_html_element(element: ElementRef<'_>, out: &mut String) {
    let raw = element.value().name();
    let name = raw.rsplit(':').next().unwrap_or(raw);

    out.push('<');
    out.push_str(name);
    out.push('>');

    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    serialize_html_element(child, out);
                }
            }
            Node::Text(text) => out.push_str(&escape_text(&text.text)),
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_names(element: &Element) -> Vec<String> {
        element
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .map(|e| e.name.clone())
            .collect()
    }

    #[test]
    fn test_sanitize_strips_bom_preamble_and_controls() {
        let text = "\u{feff}garbage\u{1}<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><root><a>x</a></root>\r\ntrailing";
        let cleaned = sanitize(text);
        assert_eq!(
            cleaned,
            format!("{}<root><a>x</a></root>", XML_DECLARATION)
        );
        assert_eq!(sanitize("no tags at all"), "");
    }

    #[test]
    fn test_strip_namespaces() {
        let text = r#"<u:root xmlns:u="urn:x" xmlns="urn:y"><u:device dlna:cap="a"><u:UDN>uuid:1</u:UDN></u:device></u:root>"#;
        assert_eq!(
            strip_namespaces(text),
            r#"<root><device cap="a"><UDN>uuid:1</UDN></device></root>"#
        );
    }

    #[test]
    fn test_escape_bare_ampersands_keeps_entities() {
        assert_eq!(
            escape_bare_ampersands("AT&T &amp; &#38; &#x26; & more"),
            "AT&amp;T &amp; &#38; &#x26; &amp; more"
        );
    }

    #[test]
    fn test_close_unterminated_tags() {
        assert_eq!(
            close_unterminated_tags("<icon><url>/a.png</icon><x/>"),
            "<icon><url>/a.png</url></icon><x/>"
        );
        assert_eq!(
            close_unterminated_tags("<root><device><UDN>u</UDN>"),
            "<root><device><UDN>u</UDN></device></root>"
        );
        assert_eq!(close_unterminated_tags("<a>x</b></a>"), "<a>x</a>");
    }

    #[test]
    fn test_strict_rejects_unbound_prefix_sanitized_accepts() {
        let data = b"<u:root><u:device><u:UDN>uuid:1</u:UDN></u:device></u:root>";
        assert!(parse_strict(data).is_none());
        let root = parse_sanitized(data).expect("sanitized strategy should parse");
        assert_eq!(root.name, "root");
        assert_eq!(child_names(&root), vec!["device"]);
    }

    #[test]
    fn test_lenient_tree_tolerates_mismatched_tags() {
        let root = build_lenient_tree("<root><device><a>1</b><UDN>AT&amp;T</UDN></device></root>")
            .expect("lenient tree");
        let device = root.children.iter().find_map(XMLNode::as_element).unwrap();
        assert_eq!(device.name, "device");
        let udn = device
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .find(|e| e.name == "UDN");
        assert!(udn.is_some());
    }

    #[test]
    fn test_extract_block_takes_outermost_device() {
        let text = "junk <device><deviceList><device>inner</device></deviceList></device> junk";
        let block = extract_block(text, &DEVICE_OPEN_RE, &DEVICE_CLOSE_RE).unwrap();
        assert!(block.starts_with("<device>"));
        assert!(block.ends_with("</deviceList></device>"));
    }

    #[test]
    fn test_html_strategy_lowercases_and_drops_prefixes() {
        let data = b"<html><body><Root><Device><FriendlyName>TV & Co</FriendlyName><dlna:X_DLNADOC>DMR-1.50</dlna:X_DLNADOC></Device></Root></body></html>";
        let root = parse_html(data).expect("html strategy");
        assert_eq!(root.name, "root");
        let device = root.children.iter().find_map(XMLNode::as_element).unwrap();
        assert_eq!(child_names(device), vec!["friendlyname", "x_dlnadoc"]);
    }

    #[test]
    fn test_parse_tree_rejects_plain_text() {
        assert!(parse_tree(b"not valid xml").is_none());
        assert!(parse_tree(b"").is_none());
    }
}
