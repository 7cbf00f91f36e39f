use crate::lms;

/// Configuration for the synchronization engine
#[derive(Clone, Debug)]
pub struct Settings {
    /// The display name of the per-course attendance container, or `None` to create
    /// buckets outside any container
    pub container_name: Option<String>,
    pub metadata: MetadataKeys,
    pub launch_params: LaunchParams,
    /// How many member writes may be in flight at once
    pub write_concurrency: usize,
    pub lms: lms::Settings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            container_name: Some(String::from("Conference attendance")),
            metadata: MetadataKeys::default(),
            launch_params: LaunchParams::default(),
            write_concurrency: 4,
            lms: lms::Settings::default(),
        }
    }
}

/// Names of the conference metadata entries carrying our references
#[derive(Clone, Debug)]
pub struct MetadataKeys {
    pub meeting: String,
    pub launch: String,
}

impl Default for MetadataKeys {
    fn default() -> Self {
        MetadataKeys {
            meeting: String::from("scheduled-meeting"),
            launch: String::from("launch-nonce"),
        }
    }
}

/// Names of the launch parameters we rely on
#[derive(Clone, Debug)]
pub struct LaunchParams {
    /// Candidates for the LMS course id, in order of preference
    pub course: Vec<String>,
    /// The user who launched the room
    pub host: String,
    /// The institution the launch came from
    pub consumer_key: String,
}

impl Default for LaunchParams {
    fn default() -> Self {
        LaunchParams {
            course: vec![String::from("custom_course_id"), String::from("context_id")],
            host: String::from("user_id"),
            consumer_key: String::from("oauth_consumer_key"),
        }
    }
}
