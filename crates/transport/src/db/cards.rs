/// Identity card queries
use rusqlite::{params, OptionalExtension};

use super::types::{card_from_row, CARD_COLUMNS};
use super::TransportDb;
use crate::card::Card;
use crate::error::Result;

impl TransportDb {
    pub fn card_for_user(&self, user_id: i64) -> Result<Option<Card>> {
        let db = self.conn();
        let card = db
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE user_id = ?1"),
                [user_id],
                card_from_row,
            )
            .optional()?;
        Ok(card)
    }

    /// Creates the user's card or points the existing one at a new image.
    pub fn upsert_card(&self, user_id: i64, qr_code: &str) -> Result<Card> {
        let db = self.conn();
        db.execute(
            "INSERT INTO cards (user_id, qr_code) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET qr_code = excluded.qr_code",
            params![user_id, qr_code],
        )?;

        let card = db.query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE user_id = ?1"),
            [user_id],
            card_from_row,
        )?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUserRow;
    use crate::identity::Role;

    fn insert_user(db: &TransportDb) -> i64 {
        db.insert_user(&NewUserRow {
            email: "a@x.com".to_string(),
            name: "A".to_string(),
            role: Role::Staff,
            id_number: "T1".to_string(),
            level: None,
            term: None,
            contact_information: "Room 1".to_string(),
            is_admin: false,
            password_hash: "x".to_string(),
        })
        .unwrap()
        .id
    }

    #[test]
    fn test_upsert_keeps_one_card_per_user() {
        let db = TransportDb::open_in_memory().unwrap();
        let user_id = insert_user(&db);
        assert!(db.card_for_user(user_id).unwrap().is_none());

        let first = db.upsert_card(user_id, "qr_codes/a.png").unwrap();
        let second = db.upsert_card(user_id, "qr_codes/b.png").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.qr_code.as_deref(), Some("qr_codes/b.png"));
    }

    #[test]
    fn test_card_is_deleted_with_user() {
        let db = TransportDb::open_in_memory().unwrap();
        let user_id = insert_user(&db);
        db.upsert_card(user_id, "qr_codes/a.png").unwrap();

        db.delete_user(user_id).unwrap();
        assert!(db.card_for_user(user_id).unwrap().is_none());
    }
}
