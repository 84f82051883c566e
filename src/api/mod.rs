pub mod sentiment;
pub mod summarize;

/// Event payloads shared by both SSE surfaces.
pub mod schemas {
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    pub struct Accepted {
        pub request_id: Uuid,
    }

    #[derive(Serialize, Debug)]
    pub struct ErrorEvent {
        pub message: String,
    }
}
