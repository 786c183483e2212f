//! SOAP bodies and response parsing for Exchange Web Services.
//!
//! Only the two operations a sync needs are covered:
//! - `FindItem` over a `CalendarView`, which expands recurring series into
//!   occurrences on the server
//! - `GetItem` for the subject, location, times, flags and attendees of the
//!   found items

use std::io::Cursor;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use calsync_core::ResponseStatus;

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::{RawAttendee, RawEvent, RawEventTime};

/// SOAP envelope namespace
pub const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// EWS types namespace
pub const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
/// EWS messages namespace
pub const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";

/// Schema version sent in `RequestServerVersion`.
const SERVER_VERSION: &str = "Exchange2010_SP2";

/// Properties requested from GetItem.
const ITEM_PROPERTIES: &[&str] = &[
    "item:Subject",
    "calendar:Location",
    "calendar:Start",
    "calendar:End",
    "calendar:IsAllDayEvent",
    "calendar:IsCancelled",
    "calendar:Organizer",
    "calendar:RequiredAttendees",
    "calendar:OptionalAttendees",
];

/// An item id with its change key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    /// The item id.
    pub id: String,
    /// The change key, if the server sent one.
    pub change_key: Option<String>,
}

/// One page of a FindItem calendar view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindItemPage {
    /// The found items with their start time.
    pub items: Vec<(ItemId, Option<DateTime<Utc>>)>,
    /// Whether the page reaches the end of the view.
    pub includes_last_item: bool,
}

/// Generates a FindItem request listing calendar occurrences in a range.
pub fn find_item_body(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_entries: usize,
) -> ProviderResult<String> {
    let mut soap = SoapWriter::new()?;

    let mut find = BytesStart::new("m:FindItem");
    find.push_attribute(("Traversal", "Shallow"));
    soap.start(find)?;

    // IdOnly plus the start, which is needed to page through the view
    soap.start(BytesStart::new("m:ItemShape"))?;
    soap.text_element("t:BaseShape", "IdOnly")?;
    soap.start(BytesStart::new("t:AdditionalProperties"))?;
    soap.field_uri("calendar:Start")?;
    soap.end("t:AdditionalProperties")?;
    soap.end("m:ItemShape")?;

    let mut view = BytesStart::new("m:CalendarView");
    view.push_attribute(("MaxEntriesReturned", max_entries.to_string().as_str()));
    view.push_attribute(("StartDate", format_ews_datetime(start).as_str()));
    view.push_attribute(("EndDate", format_ews_datetime(end).as_str()));
    soap.empty(view)?;

    soap.start(BytesStart::new("m:ParentFolderIds"))?;
    let mut folder = BytesStart::new("t:DistinguishedFolderId");
    folder.push_attribute(("Id", "calendar"));
    soap.empty(folder)?;
    soap.end("m:ParentFolderIds")?;

    soap.end("m:FindItem")?;
    soap.finish()
}

/// Generates a GetItem request for the given items.
pub fn get_item_body(ids: &[ItemId]) -> ProviderResult<String> {
    let mut soap = SoapWriter::new()?;

    soap.start(BytesStart::new("m:GetItem"))?;

    soap.start(BytesStart::new("m:ItemShape"))?;
    soap.text_element("t:BaseShape", "IdOnly")?;
    soap.start(BytesStart::new("t:AdditionalProperties"))?;
    for property in ITEM_PROPERTIES {
        soap.field_uri(property)?;
    }
    soap.end("t:AdditionalProperties")?;
    soap.end("m:ItemShape")?;

    soap.start(BytesStart::new("m:ItemIds"))?;
    for item in ids {
        let mut element = BytesStart::new("t:ItemId");
        element.push_attribute(("Id", item.id.as_str()));
        if let Some(ref change_key) = item.change_key {
            element.push_attribute(("ChangeKey", change_key.as_str()));
        }
        soap.empty(element)?;
    }
    soap.end("m:ItemIds")?;

    soap.end("m:GetItem")?;
    soap.finish()
}

/// Parses a FindItem response.
pub fn parse_find_item_response(xml: &str) -> ProviderResult<FindItemPage> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = FindItemPage {
        items: Vec::new(),
        includes_last_item: true,
    };
    let mut status = ResponseMessageStatus::default();
    let mut current: Option<(Option<ItemId>, Option<DateTime<Utc>>)> = None;
    let mut current_element: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                let local = local_name(&e);
                match local.as_str() {
                    "RootFolder" => {
                        if let Some(value) = attribute(&e, "IncludesLastItemInRange") {
                            page.includes_last_item = parse_bool(&value);
                        }
                    }
                    "CalendarItem" => current = Some((None, None)),
                    "ItemId" => {
                        if let Some((id, _)) = current.as_mut() {
                            *id = item_id(&e);
                        }
                    }
                    name if name.ends_with("ResponseMessage") => status.start(&e),
                    _ => {}
                }
                current_element = Some(local);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "CalendarItem" {
                    if let Some((Some(id), start)) = current.take() {
                        page.items.push((id, start));
                    }
                }
                current_element = None;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?;
                match current_element.as_deref() {
                    Some("Start") => {
                        if let Some((_, start)) = current.as_mut() {
                            *start = parse_datetime(&text).ok();
                        }
                    }
                    Some(element) => status.text(element, &text),
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    status.into_result("FindItem")?;
    Ok(page)
}

/// Parses a GetItem response into raw events.
pub fn parse_get_item_response(xml: &str) -> ProviderResult<Vec<RawEvent>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut events = Vec::new();
    let mut status = ResponseMessageStatus::default();
    let mut builder: Option<ItemBuilder> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let local = local_name(&e);
                open_element(&e, &local, &mut builder, &mut status);
                path.push(local);
            }
            Event::Empty(e) => {
                let local = local_name(&e);
                open_element(&e, &local, &mut builder, &mut status);
            }
            Event::End(e) => {
                let local = path.pop().unwrap_or_default();
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                debug_assert_eq!(local, name);

                if let Some(item) = builder.as_mut() {
                    match name.as_str() {
                        "Attendee" => item.finish_attendee(in_optional(&path)),
                        "Organizer" => item.finish_organizer(),
                        _ => {}
                    }
                }
                if name == "CalendarItem" {
                    if let Some(event) = builder.take().and_then(ItemBuilder::build) {
                        events.push(event);
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?;
                let element = path.last().map(String::as_str).unwrap_or_default();
                match builder.as_mut() {
                    Some(item) => item.text(element, parent(&path), &text)?,
                    None => status.text(element, &text),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    status.into_result("GetItem")?;
    Ok(events)
}

fn open_element(
    e: &BytesStart<'_>,
    local: &str,
    builder: &mut Option<ItemBuilder>,
    status: &mut ResponseMessageStatus,
) {
    match local {
        "CalendarItem" => *builder = Some(ItemBuilder::default()),
        "ItemId" => {
            if let Some(item) = builder.as_mut() {
                item.id = item_id(e).map(|id| id.id);
            }
        }
        "Attendee" | "Organizer" => {
            if let Some(item) = builder.as_mut() {
                item.mailbox = MailboxBuilder::default();
            }
        }
        name if name.ends_with("ResponseMessage") => status.start(e),
        _ => {}
    }
}

fn parent(path: &[String]) -> &str {
    path.len()
        .checked_sub(2)
        .and_then(|i| path.get(i))
        .map(String::as_str)
        .unwrap_or_default()
}

fn in_optional(path: &[String]) -> bool {
    path.last().is_some_and(|p| p == "OptionalAttendees")
}

/// Collects the fields of one `CalendarItem`.
#[derive(Debug, Default)]
struct ItemBuilder {
    id: Option<String>,
    subject: Option<String>,
    location: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    all_day: Option<bool>,
    cancelled: bool,
    mailbox: MailboxBuilder,
    attendees: Vec<RawAttendee>,
}

#[derive(Debug, Default)]
struct MailboxBuilder {
    name: Option<String>,
    email: Option<String>,
    response: Option<String>,
}

impl ItemBuilder {
    fn text(&mut self, element: &str, parent: &str, text: &str) -> ProviderResult<()> {
        match (parent, element) {
            ("CalendarItem", "Subject") => self.subject = Some(text.to_string()),
            ("CalendarItem", "Location") => self.location = Some(text.to_string()),
            ("CalendarItem", "Start") => self.start = Some(parse_datetime(text)?),
            ("CalendarItem", "End") => self.end = Some(parse_datetime(text)?),
            ("CalendarItem", "IsAllDayEvent") => self.all_day = Some(parse_bool(text)),
            ("CalendarItem", "IsCancelled") => self.cancelled = parse_bool(text),
            ("Mailbox", "Name") => self.mailbox.name = Some(text.to_string()),
            ("Mailbox", "EmailAddress") => self.mailbox.email = Some(text.to_string()),
            ("Attendee", "ResponseType") => self.mailbox.response = Some(text.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn finish_attendee(&mut self, optional: bool) {
        let mailbox = std::mem::take(&mut self.mailbox);
        if let Some(email) = mailbox.email {
            let mut attendee = RawAttendee::new(email)
                .with_optional(optional)
                .with_response(map_response_type(mailbox.response.as_deref()));
            attendee.display_name = mailbox.name;
            self.attendees.push(attendee);
        }
    }

    fn finish_organizer(&mut self) {
        let mailbox = std::mem::take(&mut self.mailbox);
        if let Some(email) = mailbox.email {
            let mut organizer = RawAttendee::organizer(email);
            organizer.display_name = mailbox.name;
            self.attendees.push(organizer);
        }
    }

    fn build(self) -> Option<RawEvent> {
        let (id, start, end) = (self.id?, self.start?, self.end?);
        let mut event = RawEvent::new(
            id,
            RawEventTime::from_datetime(start),
            RawEventTime::from_datetime(end),
        );
        event.summary = self.subject;
        event.location = self.location;
        event.all_day = self.all_day;
        event.attendees = self.attendees;
        event.cancelled = self.cancelled;
        Some(event)
    }
}

/// Maps an EWS `ResponseType` to a response status.
pub fn map_response_type(value: Option<&str>) -> ResponseStatus {
    match value {
        Some("Accept") | Some("Organizer") => ResponseStatus::Accepted,
        Some("Tentative") => ResponseStatus::Tentative,
        Some("Decline") => ResponseStatus::Declined,
        _ => ResponseStatus::NeedsAction,
    }
}

/// Tracks `ResponseClass` and the error text of EWS response messages.
#[derive(Debug, Default)]
struct ResponseMessageStatus {
    error: bool,
    code: Option<String>,
    message: Option<String>,
    fault: Option<String>,
}

impl ResponseMessageStatus {
    fn start(&mut self, e: &BytesStart<'_>) {
        if attribute(e, "ResponseClass").as_deref() == Some("Error") {
            self.error = true;
        }
    }

    fn text(&mut self, element: &str, text: &str) {
        match element {
            "ResponseCode" if self.error && self.code.is_none() => {
                self.code = Some(text.to_string())
            }
            "MessageText" if self.error && self.message.is_none() => {
                self.message = Some(text.to_string())
            }
            "faultstring" => self.fault = Some(text.to_string()),
            _ => {}
        }
    }

    fn into_result(self, operation: &str) -> ProviderResult<()> {
        if let Some(fault) = self.fault {
            return Err(ProviderError::server(format!(
                "{} SOAP fault: {}",
                operation, fault
            )));
        }
        if !self.error {
            return Ok(());
        }

        let code = self.code.unwrap_or_else(|| "unknown error".to_string());
        let message = match self.message {
            Some(text) => format!("{} failed ({}): {}", operation, code, text),
            None => format!("{} failed ({})", operation, code),
        };
        Err(match code.as_str() {
            "ErrorAccessDenied" => ProviderError::authorization(message),
            "ErrorServerBusy" => ProviderError::rate_limited(message),
            "ErrorItemNotFound" => ProviderError::not_found(message),
            _ => ProviderError::calendar(message),
        })
    }
}

/// Writes a SOAP envelope around a request element.
struct SoapWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl SoapWriter {
    fn new() -> ProviderResult<Self> {
        let mut soap = Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        };
        soap.write(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut envelope = BytesStart::new("soap:Envelope");
        envelope.push_attribute(("xmlns:soap", SOAP_NS));
        envelope.push_attribute(("xmlns:t", TYPES_NS));
        envelope.push_attribute(("xmlns:m", MESSAGES_NS));
        soap.start(envelope)?;

        soap.start(BytesStart::new("soap:Header"))?;
        let mut version = BytesStart::new("t:RequestServerVersion");
        version.push_attribute(("Version", SERVER_VERSION));
        soap.empty(version)?;
        soap.end("soap:Header")?;

        soap.start(BytesStart::new("soap:Body"))?;
        Ok(soap)
    }

    fn write(&mut self, event: Event<'_>) -> ProviderResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ProviderError::internal(format!("failed to write SOAP body: {}", e)))
    }

    fn start(&mut self, element: BytesStart<'_>) -> ProviderResult<()> {
        self.write(Event::Start(element))
    }

    fn empty(&mut self, element: BytesStart<'_>) -> ProviderResult<()> {
        self.write(Event::Empty(element))
    }

    fn end(&mut self, name: &str) -> ProviderResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> ProviderResult<()> {
        self.start(BytesStart::new(name))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn field_uri(&mut self, uri: &str) -> ProviderResult<()> {
        let mut field = BytesStart::new("t:FieldURI");
        field.push_attribute(("FieldURI", uri));
        self.empty(field)
    }

    fn finish(mut self) -> ProviderResult<String> {
        self.end("soap:Body")?;
        self.end("soap:Envelope")?;
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes)
            .map_err(|e| ProviderError::internal(format!("SOAP body is not UTF-8: {}", e)))
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn item_id(e: &BytesStart<'_>) -> Option<ItemId> {
    Some(ItemId {
        id: attribute(e, "Id")?,
        change_key: attribute(e, "ChangeKey"),
    })
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_datetime(value: &str) -> ProviderResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProviderError::invalid_response(format!("invalid date {:?}: {}", value, e)))
}

fn xml_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::invalid_response(format!("malformed EWS response: {}", e))
}

/// Formats a datetime for EWS (`xs:dateTime` in UTC).
fn format_ews_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
