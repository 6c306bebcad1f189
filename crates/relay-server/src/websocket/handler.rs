//! Inbound frame handling: parses a client frame into a [`Command`] and
//! applies it to the sending connection.

use relay_core::{Command, Envelope, Event, parse_command};
use tracing::{debug, instrument, warn};

use super::connection::ClientConnection;

/// Apply one inbound text frame to `conn`.
///
/// Returns the envelope to send back, if any. Parse failures never close the
/// connection; they produce an `error` reply instead.
#[instrument(skip_all, fields(conn_id = %conn.id))]
pub fn handle_message(conn: &ClientConnection, raw: &str) -> Option<Envelope> {
    match parse_command(raw) {
        Ok(command) => apply_command(conn, command),
        Err(e) => {
            warn!(error = %e, "invalid inbound frame");
            Some(Event::error(e.code(), e.to_string()).stamp_now())
        }
    }
}

/// Apply a parsed command to `conn`, returning the reply if the command has one.
pub fn apply_command(conn: &ClientConnection, command: Command) -> Option<Envelope> {
    match command {
        Command::Subscribe(event_type) => {
            if conn.subscribe(event_type.clone()) {
                debug!(event_type = %event_type, "subscribed");
            }
            None
        }
        Command::Unsubscribe(event_type) => {
            if conn.unsubscribe(&event_type) {
                debug!(event_type = %event_type, "unsubscribed");
            }
            None
        }
        Command::Identify(user_id) => {
            debug!(user_id, "identified");
            conn.set_user_id(user_id);
            None
        }
        Command::Authenticate(user_id) => {
            debug!(user_id, "authenticated");
            let reply = Event::authenticated(&user_id).stamp_now();
            conn.set_user_id(user_id);
            Some(reply)
        }
        Command::Ping => Some(Event::pong().stamp_now()),
        Command::Other(event_type) => {
            debug!(event_type = %event_type, "ignoring unhandled inbound type");
            None
        }
    }
}
