//! Notification dispatcher: mails every registered user when a schedule is
//! saved.

mod mail;
mod message;

pub use mail::{build_message, MailError, MailTransport, RecordingMailer, SmtpMailer};
pub use message::{schedule_update_mail, OutgoingMail};

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::identity::IdentityStore;
use crate::schedule::{ScheduleChanged, ScheduleObserver};

pub struct NotificationDispatcher {
    identity: IdentityStore,
    transport: Arc<dyn MailTransport>,
    from_address: String,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    pub fn new(identity: IdentityStore, transport: Arc<dyn MailTransport>, config: &MailConfig) -> Self {
        Self {
            identity,
            transport,
            from_address: config.from_address.clone(),
        }
    }

    /// Sends one announcement addressed to every registered user at the
    /// moment of the call. Stored addresses that cannot be parsed are
    /// skipped. With no usable recipients, nothing is sent.
    pub fn dispatch(&self, event: &ScheduleChanged) -> Result<usize, MailError> {
        let recipients: Vec<String> = self
            .identity
            .all_emails()
            .map_err(|e| MailError::Recipients {
                message: e.to_string(),
            })?
            .into_iter()
            .filter(|address| match address.parse::<lettre::Address>() {
                Ok(_) => true,
                Err(e) => {
                    warn!(schedule_id = event.schedule.id, "Skipping recipient {address:?}: {e}");
                    false
                }
            })
            .collect();

        if recipients.is_empty() {
            debug!(schedule_id = event.schedule.id, "No recipients, skipping schedule mail");
            return Ok(0);
        }

        let count = recipients.len();
        let mail = schedule_update_mail(&event.schedule, &self.from_address, recipients);
        self.transport.send(&mail)?;

        info!(
            schedule_id = event.schedule.id,
            recipients = count,
            "Sent schedule update {:?}",
            mail.subject
        );
        Ok(count)
    }
}

impl ScheduleObserver for NotificationDispatcher {
    fn schedule_changed(&self, event: &ScheduleChanged) -> Result<(), MailError> {
        self.dispatch(event).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUserRow, TransportDb};
    use crate::error::Error;
    use crate::identity::{NewUser, Role};
    use crate::schedule::{ScheduleForm, ScheduleRegistry};

    fn user(identity: &IdentityStore, email: &str, id_number: &str) {
        identity
            .create_user(NewUser {
                email: email.to_string(),
                name: "Sam".to_string(),
                id_number: id_number.to_string(),
                contact_information: "555-0100".to_string(),
                password: "pw".to_string(),
                role: Role::Staff,
                ..NewUser::default()
            })
            .unwrap();
    }

    /// A row written straight to storage, as from before addresses were
    /// checked at registration.
    fn legacy_user(db: &TransportDb, email: &str) {
        db.insert_user(&NewUserRow {
            email: email.to_string(),
            name: "Legacy".to_string(),
            role: Role::Staff,
            id_number: format!("L-{email}"),
            level: None,
            term: None,
            contact_information: "555-0100".to_string(),
            is_admin: false,
            password_hash: "x".to_string(),
        })
        .unwrap();
    }

    fn form(title: &str) -> ScheduleForm {
        ScheduleForm {
            title: title.to_string(),
            description: "Route 5 runs 15 minutes late.".to_string(),
            date: "2024-05-01".to_string(),
            time: "08:00".to_string(),
        }
    }

    fn setup(mailer: Arc<RecordingMailer>) -> (Arc<TransportDb>, IdentityStore, ScheduleRegistry) {
        let db = Arc::new(TransportDb::open_in_memory().unwrap());
        let identity = IdentityStore::new(db.clone());
        let config = MailConfig {
            from_address: "transport@campus.edu".to_string(),
            ..MailConfig::default()
        };
        let dispatcher = NotificationDispatcher::new(identity.clone(), mailer, &config);
        let registry = ScheduleRegistry::new(db.clone()).with_observer(Arc::new(dispatcher));
        (db, identity, registry)
    }

    #[test]
    fn test_one_mail_per_save_to_all_users() {
        let mailer = Arc::new(RecordingMailer::new());
        let (_db, identity, registry) = setup(mailer.clone());
        user(&identity, "a@x.com", "A1");
        user(&identity, "b@x.com", "B1");

        let schedule = registry.create(form("Bus Delay").parse().unwrap()).unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Schedule Update: Bus Delay");
        assert_eq!(sent[0].from, "transport@campus.edu");
        assert_eq!(sent[0].to, ["a@x.com", "b@x.com"]);

        // Recipients are read at send time.
        user(&identity, "c@x.com", "C1");
        registry
            .update(schedule.id, form("Bus Delay (update)").parse().unwrap())
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, ["a@x.com", "b@x.com", "c@x.com"]);
        assert!(sent[1].body.contains("Title: Bus Delay (update)\n"));
    }

    #[test]
    fn test_no_users_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::new());
        let (_db, _identity, registry) = setup(mailer.clone());

        registry.create(form("Bus Delay").parse().unwrap()).unwrap();
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn test_transport_failure_reaches_caller() {
        let mailer = Arc::new(RecordingMailer::failing("connection refused"));
        let (_db, identity, registry) = setup(mailer);
        user(&identity, "a@x.com", "A1");

        let err = registry.create(form("Bus Delay").parse().unwrap()).unwrap_err();
        let Error::Notification { schedule_id, source } = err else {
            panic!("expected notification error, got {err:?}");
        };
        assert_eq!(
            source,
            MailError::Transport {
                message: "connection refused".to_string()
            }
        );
        assert_eq!(registry.get(schedule_id).unwrap().title, "Bus Delay");
    }

    #[test]
    fn test_unparseable_stored_address_is_skipped() {
        let mailer = Arc::new(RecordingMailer::new());
        let (db, identity, registry) = setup(mailer.clone());
        legacy_user(&db, "not-an-email");
        user(&identity, "good@campus.edu", "G1");

        registry.create(form("Bus Delay").parse().unwrap()).unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ["good@campus.edu"]);
    }

    #[test]
    fn test_only_unparseable_addresses_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::new());
        let (db, _identity, registry) = setup(mailer.clone());
        legacy_user(&db, "not-an-email");

        registry.create(form("Bus Delay").parse().unwrap()).unwrap();
        assert!(mailer.sent().is_empty());
    }
}
