//! Outgoing message composition.

use serde::Serialize;

use crate::schedule::Schedule;

/// A plain-text email ready for a [`MailTransport`](super::MailTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// The schedule-change announcement. One message, every recipient on it.
pub fn schedule_update_mail(schedule: &Schedule, from: &str, recipients: Vec<String>) -> OutgoingMail {
    let subject = format!("Schedule Update: {}", schedule.title);
    let body = format!(
        "Dear User,\n\nThe transport schedule has been updated:\n\
         Title: {}\n\
         Description: {}\n\
         Date: {}\n\
         Time: {}\n\n\
         Please log in to check the latest updates.\n\n\
         Best Regards,\nCampus Transport Management Team",
        schedule.title, schedule.description, schedule.date, schedule.time
    );

    OutgoingMail {
        from: from.to_string(),
        to: recipients,
        subject,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};

    #[test]
    fn test_schedule_update_template() {
        let schedule = Schedule {
            id: 3,
            title: "Bus Delay".to_string(),
            description: "Route 5 runs 15 minutes late.".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            updated_at: Utc::now(),
        };

        let mail = schedule_update_mail(
            &schedule,
            "transport@campus.edu",
            vec!["a@x.com".to_string(), "b@x.com".to_string()],
        );

        assert_eq!(mail.subject, "Schedule Update: Bus Delay");
        assert_eq!(mail.from, "transport@campus.edu");
        assert_eq!(mail.to, ["a@x.com", "b@x.com"]);
        assert_eq!(
            mail.body,
            "Dear User,\n\nThe transport schedule has been updated:\n\
             Title: Bus Delay\n\
             Description: Route 5 runs 15 minutes late.\n\
             Date: 2024-05-01\n\
             Time: 08:00:00\n\n\
             Please log in to check the latest updates.\n\n\
             Best Regards,\nCampus Transport Management Team"
        );
    }
}
