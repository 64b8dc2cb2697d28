use uuid::Uuid;

pub fn new_connection_id() -> String {
    Uuid::new_v4().simple().to_string()
}
