use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use uuid::Uuid;

const PRODUCT_ID: &str = "-//booking-intake//demo booking//EN";
const MAX_LINE_OCTETS: usize = 75;

/// A single meeting request. Start and end are kept as local wall time and
/// emitted with a `TZID` parameter so the recipient's client does the zone
/// math.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarInvite {
    pub uid: String,
    pub stamp: DateTime<Utc>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_zone: String,
    pub summary: String,
    pub description: String,
    pub organizer: String,
    pub attendee_name: String,
    pub attendee_email: String,
}

impl CalendarInvite {
    /// `None` when the end of the meeting is not a representable time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start: NaiveDateTime,
        duration_minutes: i32,
        time_zone: &str,
        summary: &str,
        description: &str,
        organizer: &str,
        attendee_name: &str,
        attendee_email: &str,
    ) -> Option<Self> {
        let end = start.checked_add_signed(Duration::minutes(i64::from(duration_minutes)))?;
        Some(Self {
            uid: format!("{}@booking-intake", Uuid::new_v4()),
            stamp: Utc::now(),
            start,
            end,
            time_zone: time_zone.into(),
            summary: summary.into(),
            description: description.into(),
            organizer: organizer.into(),
            attendee_name: attendee_name.into(),
            attendee_email: attendee_email.into(),
        })
    }

    pub fn render(&self) -> String {
        let lines = [
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{PRODUCT_ID}"),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:REQUEST".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", self.uid),
            format!("DTSTAMP:{}", self.stamp.format("%Y%m%dT%H%M%SZ")),
            format!("DTSTART;TZID={}:{}", self.time_zone, local_stamp(&self.start)),
            format!("DTEND;TZID={}:{}", self.time_zone, local_stamp(&self.end)),
            format!("SUMMARY:{}", escape_text(&self.summary)),
            format!("DESCRIPTION:{}", escape_text(&self.description)),
            format!("ORGANIZER:mailto:{}", self.organizer),
            format!(
                "ATTENDEE;CN={};ROLE=REQ-PARTICIPANT;RSVP=TRUE:mailto:{}",
                quote_param(&self.attendee_name),
                self.attendee_email
            ),
            "STATUS:TENTATIVE".to_string(),
            "END:VEVENT".to_string(),
            "END:VCALENDAR".to_string(),
        ];

        lines.iter().map(|line| fold(line)).collect()
    }
}

fn local_stamp(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y%m%dT%H%M%S").to_string()
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn quote_param(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "'"))
}

// Long content lines are split into 75 octet chunks, continuation lines start
// with a single space. Never split inside a UTF-8 sequence.
fn fold(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + 8);
    let mut width = 0;
    for character in line.chars() {
        let octets = character.len_utf8();
        if width + octets > MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
            width = 1;
        }
        folded.push(character);
        width += octets;
    }
    folded.push_str("\r\n");
    folded
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn invite() -> CalendarInvite {
        let start = NaiveDate::from_ymd_opt(2024, 7, 4)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        CalendarInvite::new(
            start,
            45,
            "America/New_York",
            "Demo call",
            "Notes: pricing, onboarding; more",
            "sales@example.com",
            "Ada Lovelace",
            "ada@example.com",
        )
        .unwrap()
    }

    #[test]
    fn test_uses_local_time_with_tzid() {
        let rendered = invite().render();
        assert!(rendered.contains("DTSTART;TZID=America/New_York:20240704T143000\r\n"));
        assert!(rendered.contains("DTEND;TZID=America/New_York:20240704T151500\r\n"));
        assert!(!rendered.contains("DTSTART:"));
        assert!(rendered.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(rendered.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_end_out_of_range_gives_no_invite() {
        let start = NaiveDate::MAX.and_hms_opt(23, 0, 0).unwrap();
        let invite = CalendarInvite::new(
            start,
            120,
            "UTC",
            "Demo",
            "",
            "sales@example.com",
            "Ada",
            "ada@example.com",
        );
        assert!(invite.is_none());
    }

    #[test]
    fn test_each_invite_gets_fresh_uid() {
        assert_ne!(invite().uid, invite().uid);
    }

    #[test]
    fn test_text_is_escaped() {
        let rendered = invite().render();
        assert!(rendered.contains("DESCRIPTION:Notes: pricing\\, onboarding\\; more"));
        assert_eq!(escape_text("a\nb\\c"), "a\\nb\\\\c");
    }

    #[test]
    fn test_long_lines_are_folded() {
        let line = format!("DESCRIPTION:{}", "é".repeat(80));
        let folded = fold(&line);
        for physical in folded.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(physical.len() <= MAX_LINE_OCTETS, "{}", physical.len());
        }
        let unfolded = folded.replace("\r\n ", "");
        assert_eq!(unfolded, format!("{line}\r\n"));
    }
}
