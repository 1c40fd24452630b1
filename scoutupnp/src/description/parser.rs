use tracing::debug;
use xmltree::{Element, XMLNode};

use super::model::{DeviceDescription, IconDescriptor, ServiceDescriptor};
use super::xml;
use crate::errors::DescriptionError;

/// Champs dont la présence signale un élément de type device
const DEVICE_INDICATORS: &[&str] = &[
    "deviceType",
    "friendlyName",
    "manufacturer",
    "modelName",
    "UDN",
];

/// Résout une description au mieux : chaque stratégie de lecture est essayée,
/// puis l'élément device est localisé. `None` si rien n'est exploitable.
pub fn parse_description(data: &[u8]) -> Option<DeviceDescription> {
    let root = xml::parse_tree(data)?;

    let Some(device_element) = find_device_element(&root) else {
        debug!("No device element in <{}> description", root.name);
        return None;
    };

    let mut device = parse_device_element(device_element);
    device.url_base = child_text(&root, "URLBase");
    Some(device)
}

/// Validateur strict : XML bien formé obligatoire, élément device obligatoire.
pub fn validate_description(xml: &str) -> Result<DeviceDescription, DescriptionError> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| DescriptionError::InvalidXml(e.to_string()))?;

    let device_element = find_device_element(&root).ok_or(DescriptionError::NoDeviceElement)?;

    let mut device = parse_device_element(device_element);
    device.url_base = child_text(&root, "URLBase");
    Ok(device)
}

/// Localise l'élément device, du plus sûr au plus heuristique :
/// balise `device` exacte, variantes de casse, puis premier élément portant
/// un champ caractéristique (`friendlyName`, `UDN`...).
///
/// Le parcours est préfixe et inclut la racine : le device racine passe
/// toujours avant ses devices embarqués.
pub fn find_device_element(root: &Element) -> Option<&Element> {
    find_first(root, &|e| e.name == "device")
        .or_else(|| find_first(root, &|e| e.name.eq_ignore_ascii_case("device")))
        .or_else(|| {
            find_first(root, &|e| {
                DEVICE_INDICATORS
                    .iter()
                    .any(|indicator| find_child(e, indicator).is_some())
            })
        })
}

fn find_first<'a>(element: &'a Element, predicate: &dyn Fn(&Element) -> bool) -> Option<&'a Element> {
    if predicate(element) {
        return Some(element);
    }
    element
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .find_map(|child| find_first(child, predicate))
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// Enfant direct par nom : correspondance exacte d'abord, puis sans casse.
fn find_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    child_elements(element)
        .find(|c| c.name == name)
        .or_else(|| child_elements(element).find(|c| c.name.eq_ignore_ascii_case(name)))
}

fn element_text(element: &Element) -> Option<String> {
    let text: String = element
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Text(t) | XMLNode::CData(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    find_child(element, name).and_then(element_text)
}

fn list_items<'a>(element: &'a Element, list: &str, item: &str) -> Vec<&'a Element> {
    find_child(element, list)
        .map(|list| {
            child_elements(list)
                .filter(|c| c.name.eq_ignore_ascii_case(item))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_device_element(element: &Element) -> DeviceDescription {
    DeviceDescription {
        device_type: child_text(element, "deviceType"),
        friendly_name: child_text(element, "friendlyName"),
        manufacturer: child_text(element, "manufacturer"),
        manufacturer_url: child_text(element, "manufacturerURL"),
        model_name: child_text(element, "modelName"),
        model_number: child_text(element, "modelNumber"),
        model_description: child_text(element, "modelDescription"),
        model_url: child_text(element, "modelURL"),
        serial_number: child_text(element, "serialNumber"),
        udn: child_text(element, "UDN"),
        presentation_url: child_text(element, "presentationURL"),
        services: list_items(element, "serviceList", "service")
            .into_iter()
            .map(parse_service)
            .collect(),
        icons: list_items(element, "iconList", "icon")
            .into_iter()
            .map(parse_icon)
            .collect(),
        embedded_devices: list_items(element, "deviceList", "device")
            .into_iter()
            .map(parse_device_element)
            .collect(),
        ..Default::default()
    }
}

fn parse_service(element: &Element) -> ServiceDescriptor {
    ServiceDescriptor {
        service_type: child_text(element, "serviceType"),
        service_id: child_text(element, "serviceId"),
        scpd_url: child_text(element, "SCPDURL"),
        control_url: child_text(element, "controlURL"),
        event_sub_url: child_text(element, "eventSubURL"),
    }
}

fn parse_icon(element: &Element) -> IconDescriptor {
    let number = |name: &str| child_text(element, name).and_then(|v| v.parse::<u32>().ok());
    IconDescriptor {
        mimetype: child_text(element, "mimetype"),
        width: number("width"),
        height: number("height"),
        depth: number("depth"),
        url: child_text(element, "url"),
    }
}
