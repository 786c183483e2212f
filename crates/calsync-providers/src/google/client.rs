//! Google Calendar API client.
//!
//! Covers `events.list`, `events.insert` and `events.delete` on one calendar.
//! Listing only returns events whose description carries a fingerprint
//! marker; everything else on the calendar is left alone.

use std::collections::BTreeMap;
use std::time::Duration;

use calsync_core::{
    EmailAddress, EventTime, Fingerprint, NormalizedEvent, ResponseStatus, TargetEvent,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};

/// Largest page `events.list` accepts.
const MAX_PAGE_SIZE: &str = "2500";

/// Google Calendar API client bound to one access token.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GoogleCalendarClient {
    /// Creates a new client with the given access token.
    pub fn new(
        access_token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: api_base.into(),
            access_token: access_token.into(),
        })
    }

    /// Updates the access token (after refresh).
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    /// Lists the marked events of a calendar overlapping `[time_min, time_max)`.
    ///
    /// Recurring events are expanded into instances. Cancelled and unmarked
    /// events are skipped.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ProviderResult<Vec<TargetEvent>> {
        let mut events = Vec::new();
        let mut foreign = 0usize;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(calendar_id, time_min, time_max, page_token.as_deref())
                .await?;

            for item in page.items {
                match convert_event(item) {
                    Converted::Marked(event) => events.push(event),
                    Converted::Foreign => foreign += 1,
                    Converted::Skipped => {}
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            calendar = %calendar_id,
            marked = events.len(),
            foreign,
            "listed target events"
        );
        Ok(events)
    }

    async fn list_events_page(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let mut request = self
            .http_client
            .get(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", format_datetime(time_min)),
                ("timeMax", format_datetime(time_max)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", MAX_PAGE_SIZE.to_string()),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let body = send("events.list", request).await?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse events.list response: {}", e))
        })
    }

    /// Creates an event and returns its id.
    ///
    /// Attendees are not notified. `self_attendee` is added as accepted
    /// unless the event already lists it.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &NormalizedEvent,
        fingerprint: &Fingerprint,
        self_attendee: Option<&EmailAddress>,
    ) -> ProviderResult<String> {
        let body = InsertEventBody::new(event, fingerprint, self_attendee);

        let request = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "none")])
            .json(&body);

        let body = send("events.insert", request).await?;
        let created: InsertedEvent = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!(
                "failed to parse events.insert response: {}",
                e
            ))
        })?;
        Ok(created.id)
    }

    /// Deletes an event without notifying attendees.
    ///
    /// An event that is already gone (404 or 410) counts as deleted.
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> ProviderResult<()> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        let request = self
            .http_client
            .delete(url)
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "none")]);

        match send("events.delete", request).await {
            Ok(_) => Ok(()),
            Err(err) if err.code() == ProviderErrorCode::NotFound => {
                debug!(event = %event_id, "event already deleted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Sends a request and returns the body of a successful response.
async fn send(context: &str, request: reqwest::RequestBuilder) -> ProviderResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(context, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::from_transport(context, e))?;

    if status.is_success() {
        Ok(body)
    } else if status == StatusCode::UNAUTHORIZED {
        Err(ProviderError::authentication(format!(
            "{} failed ({}): access token expired or invalid",
            context, status
        )))
    } else {
        Err(ProviderError::from_status(context, status, &body))
    }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

enum Converted {
    Marked(TargetEvent),
    Foreign,
    Skipped,
}

fn convert_event(event: ApiEvent) -> Converted {
    if event.status.as_deref() == Some("cancelled") {
        return Converted::Skipped;
    }

    let Some(fingerprint) = event
        .description
        .as_deref()
        .and_then(Fingerprint::from_description)
    else {
        debug!(event = ?event.id, "skipping event without marker");
        return Converted::Foreign;
    };

    let Some(id) = event.id else {
        warn!(fingerprint = %fingerprint.short(), "marked event has no id");
        return Converted::Skipped;
    };

    let (start, end) = match (parse_time(&event.start), parse_time(&event.end)) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            warn!(event = %id, "marked event has an unreadable start or end");
            return Converted::Skipped;
        }
    };

    let mut normalized = NormalizedEvent::new(event.summary.unwrap_or_default(), start, end)
        .with_location(event.location.unwrap_or_default());
    for attendee in event.attendees {
        let Some(email) = attendee.email.as_deref().and_then(|e| EmailAddress::parse(e).ok())
        else {
            continue;
        };
        let status = attendee
            .response_status
            .as_deref()
            .map(ResponseStatus::from_api)
            .unwrap_or_default();
        normalized = normalized.with_response(email, status);
    }

    Converted::Marked(TargetEvent::new(id, fingerprint, normalized))
}

fn parse_time(time: &ApiEventTime) -> Option<EventTime> {
    if let Some(ref dt) = time.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|parsed| EventTime::from_utc(parsed.with_timezone(&Utc)));
    }
    let date = time.date.as_deref()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(EventTime::from_date)
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
    #[serde(default)]
    attendees: Vec<ApiAttendee>,
}

/// Event time as the API sends and accepts it.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
}

impl ApiEventTime {
    fn from_event_time(time: &EventTime) -> Self {
        match time {
            EventTime::DateTime(dt) => Self {
                date: None,
                date_time: Some(format_datetime(*dt)),
            },
            EventTime::AllDay(date) => Self {
                date: Some(date.format("%Y-%m-%d").to_string()),
                date_time: None,
            },
        }
    }
}

/// Attendee from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttendee {
    email: Option<String>,
    response_status: Option<String>,
}

/// Request body for events.insert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertEventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    description: String,
    start: ApiEventTime,
    end: ApiEventTime,
    attendees: Vec<InsertAttendee<'a>>,
    reminders: Reminders,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAttendee<'a> {
    email: &'a str,
    response_status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
}

impl<'a> InsertEventBody<'a> {
    fn new(
        event: &'a NormalizedEvent,
        fingerprint: &Fingerprint,
        self_attendee: Option<&'a EmailAddress>,
    ) -> Self {
        let mut attendees: BTreeMap<&'a EmailAddress, ResponseStatus> =
            event.attendees.iter().map(|(e, s)| (e, *s)).collect();
        if let Some(me) = self_attendee {
            attendees.entry(me).or_insert(ResponseStatus::Accepted);
        }

        Self {
            summary: &event.subject,
            location: Some(event.location.as_str()).filter(|l| !l.is_empty()),
            description: fingerprint.to_description(),
            start: ApiEventTime::from_event_time(&event.start),
            end: ApiEventTime::from_event_time(&event.end),
            attendees: attendees
                .into_iter()
                .map(|(email, status)| InsertAttendee {
                    email: email.as_str(),
                    response_status: status.as_str(),
                })
                .collect(),
            reminders: Reminders { use_default: true },
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, header, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EVENTS_PATH: &str = "/calendars/team%40group.calendar.google.com/events";
    const CALENDAR: &str = "team@group.calendar.google.com";

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn email(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new("token", server.uri(), Duration::from_secs(5), "calsync-test")
            .unwrap()
    }

    fn sample_event() -> NormalizedEvent {
        NormalizedEvent::new(
            "Design review",
            EventTime::from_utc(utc(2024, 1, 10, 9)),
            EventTime::from_utc(utc(2024, 1, 10, 10)),
        )
        .with_location("Room 4")
        .with_response(email("dev@example.com"), ResponseStatus::Tentative)
    }

    fn marker(event: &NormalizedEvent) -> String {
        event.fingerprint().to_description()
    }

    #[test]
    fn insert_body_shape() {
        let event = sample_event();
        let fp = event.fingerprint();
        let me = email("me@example.com");
        let body = serde_json::to_value(InsertEventBody::new(&event, &fp, Some(&me))).unwrap();

        assert_eq!(
            body,
            json!({
                "summary": "Design review",
                "location": "Room 4",
                "description": fp.to_description(),
                "start": {"dateTime": "2024-01-10T09:00:00Z"},
                "end": {"dateTime": "2024-01-10T10:00:00Z"},
                "attendees": [
                    {"email": "dev@example.com", "responseStatus": "tentative"},
                    {"email": "me@example.com", "responseStatus": "accepted"}
                ],
                "reminders": {"useDefault": true}
            })
        );
    }

    #[test]
    fn insert_body_all_day() {
        let event = NormalizedEvent::new(
            "Holiday",
            EventTime::from_date(NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()),
            EventTime::from_date(NaiveDate::from_ymd_opt(2024, 1, 12).unwrap()),
        );
        let fp = event.fingerprint();
        let body = serde_json::to_value(InsertEventBody::new(&event, &fp, None)).unwrap();

        assert_eq!(body["start"], json!({"date": "2024-01-11"}));
        assert_eq!(body["end"], json!({"date": "2024-01-12"}));
        assert!(body.get("location").is_none());
        assert_eq!(body["attendees"], json!([]));
    }

    #[test]
    fn self_attendee_keeps_existing_response() {
        let event = sample_event();
        let fp = event.fingerprint();
        let dev = email("dev@example.com");
        let body = serde_json::to_value(InsertEventBody::new(&event, &fp, Some(&dev))).unwrap();

        assert_eq!(
            body["attendees"],
            json!([{"email": "dev@example.com", "responseStatus": "tentative"}])
        );
    }

    #[test]
    fn convert_marked_event() {
        let event = sample_event();
        let item: ApiEvent = serde_json::from_value(json!({
            "id": "g1",
            "summary": "Design review",
            "location": "Room 4",
            "description": marker(&event),
            "start": {"dateTime": "2024-01-10T10:00:00+01:00", "timeZone": "Europe/Berlin"},
            "end": {"dateTime": "2024-01-10T11:00:00+01:00"},
            "attendees": [
                {"email": "Dev@Example.com", "responseStatus": "tentative"},
                {"email": "not an email"},
                {"displayName": "No address"}
            ]
        }))
        .unwrap();

        let Converted::Marked(target) = convert_event(item) else {
            panic!("expected a marked event");
        };
        assert_eq!(target.external_id, "g1");
        assert_eq!(target.fingerprint, event.fingerprint());
        assert_eq!(target.event, event);
    }

    #[test]
    fn convert_skips_foreign_and_cancelled() {
        let foreign: ApiEvent = serde_json::from_value(json!({
            "id": "g2",
            "description": "Lunch with the team",
            "start": {"date": "2024-01-10"},
            "end": {"date": "2024-01-11"}
        }))
        .unwrap();
        assert!(matches!(convert_event(foreign), Converted::Foreign));

        let cancelled: ApiEvent = serde_json::from_value(json!({
            "id": "g3",
            "status": "cancelled",
            "description": marker(&sample_event())
        }))
        .unwrap();
        assert!(matches!(convert_event(cancelled), Converted::Skipped));
    }

    #[tokio::test]
    async fn list_follows_pages() {
        let server = MockServer::start().await;
        let event = sample_event();

        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(header("authorization", "Bearer token"))
            .and(query_param("timeMin", "2024-01-03T00:00:00Z"))
            .and(query_param("timeMax", "2024-01-25T00:00:00Z"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "g1",
                    "summary": "Design review",
                    "description": marker(&event),
                    "start": {"dateTime": "2024-01-10T09:00:00Z"},
                    "end": {"dateTime": "2024-01-10T10:00:00Z"}
                }],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "g2",
                        "summary": "Someone else's",
                        "start": {"dateTime": "2024-01-11T09:00:00Z"},
                        "end": {"dateTime": "2024-01-11T10:00:00Z"}
                    },
                    {"id": "g3", "status": "cancelled"}
                ]
            })))
            .mount(&server)
            .await;

        let events = client(&server)
            .list_events(CALENDAR, utc(2024, 1, 3, 0), utc(2024, 1, 25, 0))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_id, "g1");
    }

    #[tokio::test]
    async fn insert_returns_id() {
        let server = MockServer::start().await;
        let event = sample_event();
        let fp = event.fingerprint();

        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(query_param("sendUpdates", "none"))
            .and(body_partial_json(json!({
                "summary": "Design review",
                "description": fp.to_description()
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .insert_event(CALENDAR, &event, &fp, None)
            .await
            .unwrap();
        assert_eq!(id, "new-1");
    }

    #[tokio::test]
    async fn insert_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid attendee email."))
            .mount(&server)
            .await;

        let event = sample_event();
        let err = client(&server)
            .insert_event(CALENDAR, &event, &event.fingerprint(), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::BadRequest);
        assert!(err.message().contains("400"));
        assert!(err.message().contains("Invalid attendee email."));
    }

    #[tokio::test]
    async fn delete_tolerates_gone() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/g1", EVENTS_PATH)))
            .and(query_param("sendUpdates", "none"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/g2", EVENTS_PATH)))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/g3", EVENTS_PATH)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/g4", EVENTS_PATH)))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let client = client(&server);
        client.delete_event(CALENDAR, "g1").await.unwrap();
        client.delete_event(CALENDAR, "g2").await.unwrap();
        client.delete_event(CALENDAR, "g3").await.unwrap();

        let err = client.delete_event(CALENDAR, "g4").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ServerError);
    }

    #[tokio::test]
    async fn expired_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_events(CALENDAR, utc(2024, 1, 3, 0), utc(2024, 1, 25, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }
}
