use std::sync::Arc;

use tracing::{info, warn};

use crate::card::{Card, CardIssuer, MediaStore, QrEncoder};
use crate::config::{Config, SessionConfig};
use crate::db::TransportDb;
use crate::error::Result;
use crate::identity::{IdentityStore, Registration, User, UserUpdate};
use crate::notify::{MailTransport, NotificationDispatcher};
use crate::schedule::ScheduleRegistry;
use crate::server::SessionStore;

/// Everything a request handler can reach, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppState {
    pub identity: IdentityStore,
    pub cards: CardIssuer,
    pub schedules: ScheduleRegistry,
    pub sessions: SessionStore,
    pub session_config: SessionConfig,
}

impl AppState {
    /// Wires the components together. The notification dispatcher is
    /// registered as the schedule registry's only observer.
    pub fn new(
        config: &Config,
        db: Arc<TransportDb>,
        mailer: Arc<dyn MailTransport>,
        encoder: Arc<dyn QrEncoder>,
    ) -> Self {
        let identity = IdentityStore::new(db.clone());
        let dispatcher = NotificationDispatcher::new(identity.clone(), mailer, &config.mail);

        Self {
            cards: CardIssuer::new(
                db.clone(),
                MediaStore::new(&config.storage.media_root),
                encoder,
            ),
            schedules: ScheduleRegistry::new(db).with_observer(Arc::new(dispatcher)),
            sessions: SessionStore::new(config.session.ttl()),
            session_config: config.session.clone(),
            identity,
        }
    }

    /// Creates the account and issues its first card. If the card cannot be
    /// issued the account is deleted again, so the form can be resubmitted.
    pub fn register(&self, registration: Registration) -> Result<(User, Card)> {
        let user = self.identity.register(registration)?;
        let card = match self.cards.issue_or_refresh(&user) {
            Ok(card) => card,
            Err(e) => {
                warn!(user_id = user.id, "Card issue failed, removing new account: {e}");
                if let Err(cleanup) = self.identity.delete(user.id) {
                    warn!(user_id = user.id, "Failed to remove account: {cleanup}");
                }
                return Err(e);
            }
        };
        info!(user_id = user.id, "Registered {} as {}", user.email, user.role);
        Ok((user, card))
    }

    /// Applies an admin edit and an optional new password. When the ID
    /// number changes, an existing card is re-issued first and the old image
    /// is only removed once the new one is stored.
    pub fn edit_user(
        &self,
        id: i64,
        changes: UserUpdate,
        password: Option<String>,
    ) -> Result<(User, Option<Card>)> {
        let before = self.identity.get(id)?;
        let user = self.identity.update(id, changes)?;

        if let Some(password) = password {
            self.identity.set_password(id, &password)?;
        }

        let card = match self.cards.card_for(&user)? {
            Some(old) if user.id_number != before.id_number => {
                let card = self.cards.issue_or_refresh(&user)?;
                if old.qr_code != card.qr_code {
                    if let Err(e) = self.cards.remove_image(&old) {
                        warn!(user_id = id, "Failed to remove old card image: {e}");
                    }
                }
                Some(card)
            }
            card => card,
        };
        Ok((user, card))
    }

    /// Deletes an account with its card and sessions. A card image that
    /// cannot be removed is logged and left behind.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        let user = self.identity.get(id)?;
        let card = self.cards.card_for(&user)?;

        self.identity.delete(id)?;
        self.sessions.end_user(id);

        if let Some(card) = card {
            if let Err(e) = self.cards.remove_image(&card) {
                warn!(user_id = id, "Failed to remove card image: {e}");
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::*;
    use crate::error::Error;
    use crate::identity::UserUpdate;
    use crate::notify::RecordingMailer;

    #[test]
    fn test_register_issues_card() {
        let app = test_app();
        let (user, card) = app
            .state
            .register(registration("sam@campus.edu", "student", "S100"))
            .unwrap();

        assert_eq!(card.user_id, user.id);
        let expected = format!("qr_codes/qr_code_{}_S100.png", user.id);
        assert_eq!(card.qr_code.as_deref(), Some(expected.as_str()));
        assert!(app.state.cards.media().read(&expected).unwrap().is_some());
    }

    #[test]
    fn test_delete_user_removes_card_and_sessions() {
        let app = test_app();
        let (user, card) = app
            .state
            .register(registration("sam@campus.edu", "staff", "T7"))
            .unwrap();
        let token = app.state.sessions.start(user.id);

        app.state.delete_user(user.id).unwrap();

        assert!(matches!(app.state.identity.get(user.id), Err(Error::NotFound { .. })));
        assert_eq!(app.state.sessions.user_id(&token), None);
        let path = card.qr_code.unwrap();
        assert!(app.state.cards.media().read(&path).unwrap().is_none());
        assert!(matches!(
            app.state.delete_user(user.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_failed_card_issue_leaves_no_account() {
        let encoder = Arc::new(SwitchableEncoder::default());
        encoder.fail();
        let app = test_app_with(Arc::new(RecordingMailer::new()), encoder);

        let result = app
            .state
            .register(registration("sam@campus.edu", "staff", "T7"));
        assert!(matches!(result, Err(Error::QrEncode { .. })));
        assert!(!app.state.identity.email_exists("sam@campus.edu").unwrap());
        assert!(!app.state.identity.id_number_exists("T7").unwrap());
    }

    #[test]
    fn test_edit_id_number_reissues_card() {
        let app = test_app();
        let (user, old) = app
            .state
            .register(registration("sam@campus.edu", "staff", "T7"))
            .unwrap();

        let (user, card) = app
            .state
            .edit_user(
                user.id,
                UserUpdate {
                    id_number: Some("T8".to_string()),
                    ..UserUpdate::default()
                },
                None,
            )
            .unwrap();

        let new_path = format!("qr_codes/qr_code_{}_T8.png", user.id);
        let card = card.unwrap();
        assert_eq!(card.id, old.id);
        assert_eq!(card.qr_code.as_deref(), Some(new_path.as_str()));
        let media = app.state.cards.media();
        assert!(media.read(&new_path).unwrap().is_some());
        assert!(media.read(&old.qr_code.unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_failed_reissue_keeps_old_image() {
        let encoder = Arc::new(SwitchableEncoder::default());
        let app = test_app_with(Arc::new(RecordingMailer::new()), encoder.clone());
        let (user, old) = app
            .state
            .register(registration("sam@campus.edu", "staff", "T7"))
            .unwrap();

        encoder.fail();
        let result = app.state.edit_user(
            user.id,
            UserUpdate {
                id_number: Some("T8".to_string()),
                ..UserUpdate::default()
            },
            None,
        );
        assert!(matches!(result, Err(Error::QrEncode { .. })));

        let card = app.state.cards.card_for(&user).unwrap().unwrap();
        assert_eq!(card, old);
        let path = card.qr_code.unwrap();
        assert!(app.state.cards.media().read(&path).unwrap().is_some());
    }

    #[test]
    fn test_edit_rejects_long_id_number_before_writing() {
        let app = test_app();
        let (user, old) = app
            .state
            .register(registration("sam@campus.edu", "staff", "T7"))
            .unwrap();

        let result = app.state.edit_user(
            user.id,
            UserUpdate {
                id_number: Some("X".repeat(250)),
                ..UserUpdate::default()
            },
            Some("new-pass".to_string()),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(app.state.identity.get(user.id).unwrap().id_number, "T7");
        assert!(app.state.identity.authenticate("sam@campus.edu", "s3cret-pass").is_ok());
        let path = old.qr_code.unwrap();
        assert!(app.state.cards.media().read(&path).unwrap().is_some());
    }
}
