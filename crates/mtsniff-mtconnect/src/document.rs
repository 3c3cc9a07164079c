//! MTConnect response document parsing
//!
//! Only the parts of the documents that discovery needs are modelled: the
//! header, the list of `Device` elements and the list of agent errors.
//! Everything else in a probe response (components, data items, ...) is
//! skipped by the deserializer.

use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

/// Root element of a successful probe response
pub const DEVICES_ROOT: &str = "MTConnectDevices";

/// Root element of a protocol-level error response
pub const ERROR_ROOT: &str = "MTConnectError";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Empty document")]
    Empty,
    #[error("Malformed XML: {0}")]
    Xml(String),
    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),
}

/// Document header attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub sender: Option<String>,
    pub version: Option<String>,
    pub instance_id: Option<String>,
    pub creation_time: Option<String>,
}

/// One `Device` element of an `MTConnectDevices` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub id: Option<String>,
    pub uuid: Option<String>,
}

/// Successful probe response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicesDocument {
    pub header: Header,
    pub devices: Vec<DeviceDescriptor>,
}

/// One error reported by an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentError {
    pub code: Option<String>,
    pub message: String,
}

/// Protocol-level error response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDocument {
    pub header: Header,
    pub errors: Vec<AgentError>,
}

/// A parsed MTConnect response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Devices(DevicesDocument),
    Error(ErrorDocument),
}

// Wire structures

#[derive(Deserialize, Default)]
struct HeaderXml {
    #[serde(rename = "@sender", default)]
    sender: Option<String>,
    #[serde(rename = "@version", default)]
    version: Option<String>,
    #[serde(rename = "@instanceId", default)]
    instance_id: Option<String>,
    #[serde(rename = "@creationTime", default)]
    creation_time: Option<String>,
}

impl From<HeaderXml> for Header {
    fn from(h: HeaderXml) -> Self {
        Self {
            sender: h.sender,
            version: h.version,
            instance_id: h.instance_id,
            creation_time: h.creation_time,
        }
    }
}

#[derive(Deserialize)]
struct DevicesXml {
    #[serde(rename = "Header", default)]
    header: Option<HeaderXml>,
    #[serde(rename = "Devices", default)]
    devices: Option<DeviceListXml>,
}

#[derive(Deserialize)]
struct DeviceListXml {
    #[serde(rename = "Device", default)]
    device: Vec<DeviceXml>,
}

#[derive(Deserialize)]
struct DeviceXml {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@uuid", default)]
    uuid: Option<String>,
}

impl From<DeviceXml> for DeviceDescriptor {
    fn from(d: DeviceXml) -> Self {
        // name is mandatory in the standard but older agents sometimes omit it
        let name = d
            .name
            .clone()
            .or_else(|| d.id.clone())
            .unwrap_or_default();
        Self {
            name,
            id: d.id,
            uuid: d.uuid,
        }
    }
}

#[derive(Deserialize)]
struct ErrorXml {
    #[serde(rename = "Header", default)]
    header: Option<HeaderXml>,
    #[serde(rename = "Errors", default)]
    errors: Option<ErrorListXml>,
    /// 1.0 - 1.2 agents put a single Error directly under the root
    #[serde(rename = "Error", default)]
    error: Vec<ErrorEntryXml>,
}

#[derive(Deserialize)]
struct ErrorListXml {
    #[serde(rename = "Error", default)]
    error: Vec<ErrorEntryXml>,
}

#[derive(Deserialize)]
struct ErrorEntryXml {
    #[serde(rename = "@errorCode", default)]
    code: Option<String>,
    #[serde(rename = "$text", default)]
    message: String,
}

impl From<ErrorEntryXml> for AgentError {
    fn from(e: ErrorEntryXml) -> Self {
        Self {
            code: e.code,
            message: e.message.trim().to_string(),
        }
    }
}

/// Parse an MTConnect response body
pub fn parse_document(xml: &str) -> Result<Document, DocumentError> {
    let root = root_element(xml)?;

    match root.as_str() {
        DEVICES_ROOT => {
            let raw: DevicesXml = from_str(xml).map_err(|e| DocumentError::Xml(e.to_string()))?;
            Ok(Document::Devices(DevicesDocument {
                header: raw.header.unwrap_or_default().into(),
                devices: raw
                    .devices
                    .map(|list| list.device.into_iter().map(Into::into).collect())
                    .unwrap_or_default(),
            }))
        }
        ERROR_ROOT => {
            let raw: ErrorXml = from_str(xml).map_err(|e| DocumentError::Xml(e.to_string()))?;
            let mut errors: Vec<AgentError> = raw
                .errors
                .map(|list| list.error.into_iter().map(Into::into).collect())
                .unwrap_or_default();
            errors.extend(raw.error.into_iter().map(AgentError::from));
            Ok(Document::Error(ErrorDocument {
                header: raw.header.unwrap_or_default().into(),
                errors,
            }))
        }
        other => Err(DocumentError::UnexpectedRoot(other.to_string())),
    }
}

/// Local name of the first element in the document
fn root_element(xml: &str) -> Result<String, DocumentError> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(DocumentError::Empty),
            Ok(_) => continue,
            Err(e) => return Err(DocumentError::Xml(e.to_string())),
        }
    }
}
