//! Card issuer: the QR-coded identity card each user carries.
//!
//! The QR payload is derived from the user's primary key and ID number, and
//! the image is stored under a file name built from the same pair. Issuing a
//! card twice for the same user therefore rewrites one file instead of
//! accumulating copies.

mod media;
mod qr;

pub use media::MediaStore;
pub use qr::{PngQrEncoder, QrEncoder};

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::TransportDb;
use crate::error::{Error, Result};
use crate::identity::User;

/// Subdirectory of the media root holding card images.
pub const QR_CODE_DIR: &str = "qr_codes";

/// URL prefix the media root is served under.
pub const MEDIA_URL: &str = "/media/";

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// A user's identity card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub id: i64,
    pub user_id: i64,
    /// Path of the PNG relative to the media root.
    pub qr_code: Option<String>,
}

impl Card {
    pub fn qr_code_url(&self) -> Option<String> {
        self.qr_code.as_ref().map(|path| format!("{MEDIA_URL}{path}"))
    }
}

/// Text encoded into a stored card.
pub fn card_payload(user_id: i64, id_number: &str) -> String {
    format!("SERIAL: {user_id}, ID: {id_number}")
}

/// Text encoded into the throwaway QR on the card preview page.
pub fn inline_payload(id_number: &str) -> String {
    format!("UserID: {id_number}")
}

/// `qr_code_{id}_{id_number}.png`, with anything unsafe in a file name
/// replaced by `_`.
pub fn card_file_name(user_id: i64, id_number: &str) -> String {
    let id_number = UNSAFE_FILE_CHARS.replace_all(id_number, "_");
    format!("qr_code_{user_id}_{id_number}.png")
}

/// True if `file_name` could have come from [`card_file_name`].
pub fn is_card_file_name(file_name: &str) -> bool {
    file_name.starts_with("qr_code_")
        && file_name.ends_with(".png")
        && !UNSAFE_FILE_CHARS.is_match(file_name)
}

pub struct CardIssuer {
    db: Arc<TransportDb>,
    media: MediaStore,
    encoder: Arc<dyn QrEncoder>,
}

impl fmt::Debug for CardIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardIssuer")
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

impl CardIssuer {
    pub fn new(db: Arc<TransportDb>, media: MediaStore, encoder: Arc<dyn QrEncoder>) -> Self {
        Self { db, media, encoder }
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Regenerates the user's card image from their current ID number and
    /// stores it, creating the card row if needed.
    pub fn issue_or_refresh(&self, user: &User) -> Result<Card> {
        if user.id_number.trim().is_empty() {
            return Err(Error::MissingIdentifier { user_id: user.id });
        }

        let payload = card_payload(user.id, &user.id_number);
        let png = self.encoder.encode_png(&payload)?;

        let relative = format!("{QR_CODE_DIR}/{}", card_file_name(user.id, &user.id_number));
        self.media.write(&relative, &png)?;

        let card = self.db.upsert_card(user.id, &relative)?;
        info!(user_id = user.id, card_id = card.id, "Issued card {relative}");
        Ok(card)
    }

    /// Returns the user's existing card untouched, or issues the first one.
    pub fn get_or_issue(&self, user: &User) -> Result<Card> {
        if let Some(card) = self.db.card_for_user(user.id)? {
            debug!(user_id = user.id, "Card already issued");
            return Ok(card);
        }
        self.issue_or_refresh(user)
    }

    pub fn card_for(&self, user: &User) -> Result<Option<Card>> {
        self.db.card_for_user(user.id)
    }

    /// PNG for the card preview. Never written anywhere.
    pub fn render_inline(&self, user: &User) -> Result<Vec<u8>> {
        self.encoder.encode_png(&inline_payload(&user.id_number))
    }

    /// Bytes of a stored card image, by bare file name.
    pub fn read_image(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        if !is_card_file_name(file_name) {
            return Ok(None);
        }
        self.media.read(&format!("{QR_CODE_DIR}/{file_name}"))
    }

    /// Deletes a card's image file, if it has one.
    pub fn remove_image(&self, card: &Card) -> Result<bool> {
        match &card.qr_code {
            Some(path) => self.media.remove(path),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityStore, NewUser, Role};
    use std::sync::Mutex;

    /// Records payloads instead of drawing them.
    #[derive(Default)]
    struct RecordingEncoder {
        payloads: Mutex<Vec<String>>,
    }

    impl QrEncoder for RecordingEncoder {
        fn encode_png(&self, payload: &str) -> Result<Vec<u8>> {
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(payload.as_bytes().to_vec())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        identity: IdentityStore,
        issuer: CardIssuer,
        encoder: Arc<RecordingEncoder>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(TransportDb::open_in_memory().unwrap());
        let encoder = Arc::new(RecordingEncoder::default());
        let issuer = CardIssuer::new(db.clone(), MediaStore::new(dir.path()), encoder.clone());
        Fixture {
            _dir: dir,
            identity: IdentityStore::new(db),
            issuer,
            encoder,
        }
    }

    fn user(identity: &IdentityStore, id_number: &str) -> User {
        identity
            .create_user(NewUser {
                email: format!("{id_number}@x.com"),
                name: "Sam".to_string(),
                id_number: id_number.to_string(),
                contact_information: "555".to_string(),
                password: "pw".to_string(),
                role: Role::Staff,
                ..NewUser::default()
            })
            .unwrap()
    }

    #[test]
    fn test_payload_and_file_name() {
        assert_eq!(card_payload(7, "S1"), "SERIAL: 7, ID: S1");
        assert_eq!(inline_payload("S1"), "UserID: S1");
        assert_eq!(card_file_name(7, "S1"), "qr_code_7_S1.png");
        assert_eq!(card_file_name(7, "A/B 9"), "qr_code_7_A_B_9.png");

        assert!(is_card_file_name("qr_code_7_S1.png"));
        assert!(!is_card_file_name("../qr_code_7_S1.png"));
        assert!(!is_card_file_name("other.png"));
    }

    #[test]
    fn test_issue_is_idempotent() {
        let f = fixture();
        let user = user(&f.identity, "S1");

        let first = f.issuer.issue_or_refresh(&user).unwrap();
        let second = f.issuer.issue_or_refresh(&user).unwrap();

        let expected = format!("qr_codes/qr_code_{}_S1.png", user.id);
        assert_eq!(first.qr_code.as_deref(), Some(expected.as_str()));
        assert_eq!(first, second);

        let payload = format!("SERIAL: {}, ID: S1", user.id);
        assert_eq!(*f.encoder.payloads.lock().unwrap(), [payload.clone(), payload.clone()]);

        let stored = f.issuer.media().read(&expected).unwrap().unwrap();
        assert_eq!(stored, payload.as_bytes());

        let files = std::fs::read_dir(f.issuer.media().root().join(QR_CODE_DIR))
            .unwrap()
            .count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_missing_identifier_writes_nothing() {
        let f = fixture();
        let mut user = user(&f.identity, "S1");
        user.id_number = String::new();

        assert!(matches!(
            f.issuer.issue_or_refresh(&user),
            Err(Error::MissingIdentifier { user_id }) if user_id == user.id
        ));
        assert!(f.issuer.card_for(&user).unwrap().is_none());
        assert!(f.encoder.payloads.lock().unwrap().is_empty());
        assert!(!f.issuer.media().root().join(QR_CODE_DIR).exists());
    }

    #[test]
    fn test_get_or_issue_does_not_refresh() {
        let f = fixture();
        let mut user = user(&f.identity, "S1");

        let card = f.issuer.get_or_issue(&user).unwrap();
        user.id_number = "S9".to_string();
        let again = f.issuer.get_or_issue(&user).unwrap();

        assert_eq!(card, again);
        assert_eq!(f.encoder.payloads.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_render_inline_is_not_persisted() {
        let f = fixture();
        let user = user(&f.identity, "S1");

        let png = f.issuer.render_inline(&user).unwrap();
        assert_eq!(png, b"UserID: S1");
        assert!(f.issuer.card_for(&user).unwrap().is_none());
    }

    #[test]
    fn test_read_and_remove_image() {
        let f = fixture();
        let user = user(&f.identity, "S1");
        let card = f.issuer.issue_or_refresh(&user).unwrap();
        let file_name = card_file_name(user.id, "S1");

        assert!(f.issuer.read_image(&file_name).unwrap().is_some());
        assert!(f.issuer.read_image("../transport.db").unwrap().is_none());
        assert_eq!(
            card.qr_code_url(),
            Some(format!("/media/qr_codes/{file_name}"))
        );

        assert!(f.issuer.remove_image(&card).unwrap());
        assert!(f.issuer.read_image(&file_name).unwrap().is_none());
    }
}
