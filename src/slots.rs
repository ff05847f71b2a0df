use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Minutes after UTC midnight offered as demo slots.
const DEMO_SLOT_MINUTES: [i64; 3] = [600, 780, 930];

pub fn demo_slots(date: NaiveDate) -> Vec<DateTime<Utc>> {
    let midnight = date.and_time(chrono::NaiveTime::MIN).and_utc();
    DEMO_SLOT_MINUTES
        .iter()
        .map(|minutes| midnight + Duration::minutes(*minutes))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timezone::to_iso;

    #[test]
    fn test_three_fixed_offsets() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let slots: Vec<String> = demo_slots(date).iter().map(to_iso).collect();
        assert_eq!(
            slots,
            vec![
                "2024-01-01T10:00:00.000Z",
                "2024-01-01T13:00:00.000Z",
                "2024-01-01T15:30:00.000Z",
            ]
        );
    }

    #[test]
    fn test_slots_stay_on_requested_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        for slot in demo_slots(date) {
            assert_eq!(slot.date_naive(), date);
        }
    }
}
