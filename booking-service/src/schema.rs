diesel::table! {
    booking_line_items (booking_id, position) {
        booking_id -> Uuid,
        position -> Int4,
        meal_id -> Uuid,
        quantity -> Int4,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        farm_id -> Uuid,
        date -> Date,
        requester_email -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    farm_availability (farm_id, date) {
        farm_id -> Uuid,
        date -> Date,
    }
}

diesel::table! {
    farms (id) {
        id -> Uuid,
        name -> Varchar,
        location -> Varchar,
        description -> Text,
        images -> Jsonb,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    meals (id) {
        id -> Uuid,
        farm_id -> Uuid,
        position -> Int4,
        name -> Varchar,
        description -> Text,
        price -> Numeric,
        quantity -> Int4,
    }
}

diesel::joinable!(booking_line_items -> bookings (booking_id));
diesel::joinable!(farm_availability -> farms (farm_id));
diesel::joinable!(meals -> farms (farm_id));

diesel::allow_tables_to_appear_in_same_query!(
    booking_line_items,
    bookings,
    farm_availability,
    farms,
    meals,
);
