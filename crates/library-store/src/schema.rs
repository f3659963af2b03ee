//! Diesel table definitions for the event store and projection tables
//! (spec §6's logical schema, mapped onto Postgres rather than Mongo --
//! see `StoreConfig`'s doc comment in `library-core::config` for why).

diesel::table! {
    event_store (id) {
        id -> Int8,
        aggregate_id -> Text,
        event_type -> Text,
        version -> Int8,
        global_version -> Int8,
        schema_version -> Int4,
        timestamp -> Timestamptz,
        payload -> Jsonb,
        metadata -> Jsonb,
    }
}

diesel::table! {
    global_version_counter (id) {
        id -> Text,
        seq -> Int8,
    }
}

diesel::table! {
    book_projections (id) {
        id -> Text,
        version -> Int8,
        deleted_at -> Nullable<Timestamptz>,
        document -> Jsonb,
    }
}

diesel::table! {
    reservation_projections (id) {
        id -> Text,
        version -> Int8,
        deleted_at -> Nullable<Timestamptz>,
        document -> Jsonb,
    }
}

diesel::table! {
    wallet_projections (id) {
        id -> Text,
        version -> Int8,
        deleted_at -> Nullable<Timestamptz>,
        document -> Jsonb,
    }
}
