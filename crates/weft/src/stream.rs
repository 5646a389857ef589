//! A synced stream: a view plus the cookie it was synced to.

use tracing::warn;
use weft_core::{now_millis, validate_event, validate_event_structure, Event, StreamId};
use weft_sync::{StreamAndCookie, SyncCookie};
use weft_view::{rollup_stream, Notification, StreamStateView};

use crate::error::{ClientError, Result};

/// One stream held by a client.
#[derive(Debug, Clone)]
pub struct Stream {
    view: StreamStateView,
    sync_cookie: Option<SyncCookie>,
}

impl Stream {
    /// Build a stream from a full load returned by a node.
    ///
    /// A full load replays history, so delegate expiry is checked against
    /// each event's own creation time.
    pub fn from_stream_and_cookie(
        slice: &StreamAndCookie,
        verify: bool,
    ) -> Result<(Self, Vec<Notification>)> {
        let events = accepted_events(&slice.stream_id, &slice.events, verify, None)?;
        let (view, notifications) = rollup_stream(&slice.stream_id, &events)?;
        let stream = Self {
            view,
            sync_cookie: Some(slice.sync_cookie.clone()),
        };
        Ok((stream, notifications))
    }

    /// Fold a sync slice and advance the cookie.
    ///
    /// The slice must continue from the cookie this stream holds. Events
    /// whose authorship fails are dropped; any other failure rejects the
    /// whole slice and leaves both the view and the cookie unchanged.
    /// Delegate expiry is checked against the wall clock.
    pub fn apply(&mut self, slice: &StreamAndCookie, verify: bool) -> Result<Vec<Notification>> {
        self.apply_at(slice, verify, now_millis())
    }

    /// [`Stream::apply`] with delegate expiry checked against `now_ms`.
    pub fn apply_at(
        &mut self,
        slice: &StreamAndCookie,
        verify: bool,
        now_ms: i64,
    ) -> Result<Vec<Notification>> {
        if slice.original_sync_cookie != self.sync_cookie {
            return Err(ClientError::SyncCookieMismatch {
                stream_id: slice.stream_id.clone(),
                expected: self.sync_cookie.clone(),
                got: slice.original_sync_cookie.clone(),
            });
        }

        let events = accepted_events(&slice.stream_id, &slice.events, verify, Some(now_ms))?;
        let notifications = self.view.add_events(&events)?;
        self.sync_cookie = Some(slice.sync_cookie.clone());
        Ok(notifications)
    }

    pub fn stream_id(&self) -> &StreamId {
        self.view.stream_id()
    }

    pub fn view(&self) -> &StreamStateView {
        &self.view
    }

    pub fn sync_cookie(&self) -> Option<&SyncCookie> {
        self.sync_cookie.as_ref()
    }
}

/// Check each event and keep the ones that pass.
///
/// Delegate expiry is checked against `now_ms`, or against the event's own
/// creation time when it is `None`.
fn accepted_events(
    stream_id: &StreamId,
    events: &[Event],
    verify: bool,
    now_ms: Option<i64>,
) -> Result<Vec<Event>> {
    let mut accepted = Vec::with_capacity(events.len());
    for event in events {
        let checked = if verify {
            validate_event(event, now_ms.unwrap_or_else(|| event.created_at_ms()))
        } else {
            validate_event_structure(event)
        };
        match checked {
            Ok(()) => accepted.push(event.clone()),
            Err(error) if error.is_per_event() => {
                warn!(%stream_id, hash = %event.hash, %error, "dropping event");
            }
            Err(error) => return Err(error.into()),
        }
    }
    Ok(accepted)
}
