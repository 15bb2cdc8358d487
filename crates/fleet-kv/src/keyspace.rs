//! Keyspace notification channel names
//!
//! A notification for key `expert_agents:http://a:1` in database 0 arrives on
//! channel `__keyspace@0__:expert_agents:http://a:1`. The channel name is the
//! only place the key appears, so parsing is strict about the prefix.

/// Channel layout for one key namespace in one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceChannel {
    prefix: String,
}

impl KeyspaceChannel {
    /// Channels for keys named `<namespace>:<suffix>` in database `db`
    pub fn new(db: i64, namespace: &str) -> Self {
        Self {
            prefix: format!("__keyspace@{db}__:{namespace}:"),
        }
    }

    /// Glob pattern matching every channel of this namespace
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Channel name for a given key suffix
    pub fn channel_for(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    /// Extract the key suffix from `channel`
    ///
    /// Returns `None` when the channel belongs to another database or
    /// namespace, or when the suffix is empty.
    pub fn parse<'a>(&self, channel: &'a str) -> Option<&'a str> {
        channel
            .strip_prefix(self.prefix.as_str())
            .filter(|suffix| !suffix.is_empty())
    }
}

/// Channel on which a notification for `key` in database `db` is published
pub fn channel_for_key(db: i64, key: &str) -> String {
    format!("__keyspace@{db}__:{key}")
}

/// Match `text` against a subscription glob supporting `*` and `?`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
