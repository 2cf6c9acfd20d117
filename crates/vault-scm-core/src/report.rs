//! `VERSIONHISTORY` report parsing.
//!
//! The client writes an XML document with one `item` element per change.
//! Item fields are read from attributes (what the client emits) or from
//! child elements of the same name; nothing else about the schema is
//! assumed.
//!
//! ```xml
//! <vault>
//!   <history>
//!     <item txid="1021" date="12/7/2011 10:14:02 AM" name="$/trunk" version="57"
//!           user="jdoe" comment="fix build" actionString="Checked In" />
//!   </history>
//! </vault>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::domain::{Result, VaultScmError};

const ITEM: &[u8] = b"item";

/// The four fields of a history item that changelogs use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryItem {
    pub comment: String,
    pub version: String,
    pub date: String,
    pub user: String,
}

impl HistoryItem {
    fn field_mut(&mut self, name: &[u8]) -> Option<&mut String> {
        match name {
            b"comment" => Some(&mut self.comment),
            b"version" => Some(&mut self.version),
            b"date" => Some(&mut self.date),
            b"user" => Some(&mut self.user),
            _ => None,
        }
    }

    fn from_attributes(start: &BytesStart<'_>) -> Result<Self> {
        let mut item = HistoryItem::default();
        for attr in start.attributes() {
            let attr = attr.map_err(parse_error)?;
            if let Some(field) = item.field_mut(attr.key.local_name().as_ref()) {
                *field = attr.unescape_value().map_err(parse_error)?.into_owned();
            }
        }
        Ok(item)
    }
}

/// A parsed history report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub items: Vec<HistoryItem>,
}

impl HistoryReport {
    /// Parse a report.
    ///
    /// Every `item` element counts, including one nested inside another,
    /// and items keep document order. A document without a root element,
    /// with more than one, or that ends before its elements are closed is
    /// an error: the client was cut off or wrote nothing usable.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut items: Vec<HistoryItem> = Vec::new();
        let mut depth = 0usize;
        let mut root_closed = false;
        // (index into `items`, depth) of each item element still open.
        let mut open: Vec<(usize, usize)> = Vec::new();
        let mut field: Option<Vec<u8>> = None;

        loop {
            let event = reader.read_event().map_err(parse_error)?;
            if matches!(event, Event::Start(_) | Event::Empty(_)) && depth == 0 {
                if root_closed {
                    return Err(VaultScmError::ReportParse(
                        "report has more than one root element".to_string(),
                    ));
                }
                if matches!(event, Event::Empty(_)) {
                    root_closed = true;
                }
            }
            match event {
                Event::Start(start) => {
                    depth += 1;
                    let name = start.local_name();
                    if name.as_ref() == ITEM {
                        items.push(HistoryItem::from_attributes(&start)?);
                        open.push((items.len() - 1, depth));
                        field = None;
                    } else if let Some(&(index, _)) = open.last() {
                        if items[index].field_mut(name.as_ref()).is_some() {
                            field = Some(name.as_ref().to_vec());
                        }
                    }
                }
                Event::Empty(start) => {
                    if start.local_name().as_ref() == ITEM {
                        items.push(HistoryItem::from_attributes(&start)?);
                    }
                }
                Event::Text(text) => {
                    if let (Some(&(index, _)), Some(name)) = (open.last(), field.as_deref()) {
                        let value = text.unescape().map_err(parse_error)?;
                        if let Some(slot) = items[index].field_mut(name) {
                            slot.push_str(&value);
                        }
                    }
                }
                Event::CData(data) => {
                    if let (Some(&(index, _)), Some(name)) = (open.last(), field.as_deref()) {
                        if let Some(slot) = items[index].field_mut(name) {
                            slot.push_str(&String::from_utf8_lossy(&data));
                        }
                    }
                }
                Event::End(_) => {
                    if open.last().is_some_and(|&(_, d)| d == depth) {
                        open.pop();
                    }
                    field = None;
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        root_closed = true;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !root_closed && depth == 0 {
            return Err(VaultScmError::ReportParse("report has no root element".to_string()));
        }
        if depth != 0 {
            return Err(VaultScmError::ReportParse(format!(
                "report truncated with {depth} unclosed element(s)"
            )));
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_error(e: impl std::fmt::Display) -> VaultScmError {
    VaultScmError::ReportParse(e.to_string())
}
