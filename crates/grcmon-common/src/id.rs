use uuid::Uuid;

/// New globally unique id (UUID v4, hyphenated).
pub fn next_id() -> String {
    Uuid::new_v4().to_string()
}

/// Short random suffix used to disambiguate worker processes on one host.
pub fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
