diesel::table! {
    bookings (id) {
        id -> Int4,
        created_at -> Timestamptz,
        full_name -> Text,
        email -> Text,
        phone -> Nullable<Text>,
        company -> Nullable<Text>,
        date -> Nullable<Date>,
        time -> Nullable<Text>,
        time_zone -> Nullable<Text>,
        duration_minutes -> Nullable<Int4>,
        start_utc -> Nullable<Timestamptz>,
        end_utc -> Nullable<Timestamptz>,
        notes -> Nullable<Text>,
        source -> Nullable<Text>,
    }
}
