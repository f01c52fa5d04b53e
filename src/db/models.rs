/// Identity and session-event models plus the static column metadata
/// shared by schema creation and single-field updates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One column of a durable record set
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
}

/// Columns of the `identities` table, in declaration order. The
/// store-assigned `id` primary key is handled separately.
pub const IDENTITY_COLUMNS: &[ColumnDef] = &[
    ColumnDef { name: "email", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "name", sql_type: "TEXT" },
    ColumnDef { name: "nickname", sql_type: "TEXT" },
    ColumnDef { name: "title", sql_type: "TEXT" },
    ColumnDef { name: "phone", sql_type: "TEXT" },
    ColumnDef { name: "supervisor_name", sql_type: "TEXT" },
    ColumnDef { name: "supervisor_phone", sql_type: "TEXT" },
    ColumnDef { name: "role", sql_type: "TEXT NOT NULL DEFAULT 'user'" },
    ColumnDef { name: "last_mod_by", sql_type: "TEXT" },
    ColumnDef { name: "last_mod", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "first_login", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "last_login", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "salt", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "hash", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "login_attempts", sql_type: "INTEGER NOT NULL DEFAULT 0" },
    ColumnDef { name: "locked_after", sql_type: "TEXT" },
];

/// Columns of the `events` table, in declaration order.
pub const EVENT_COLUMNS: &[ColumnDef] = &[
    ColumnDef { name: "email", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "device", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "login_time", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "login_type", sql_type: "TEXT NOT NULL" },
    ColumnDef { name: "logout_time", sql_type: "TEXT" },
    ColumnDef { name: "logout_type", sql_type: "TEXT NOT NULL DEFAULT 'pending'" },
];

/// Identity role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown values fall back to the least-privileged role.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// How a session was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Local,
    Sso,
    Emergency,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginType::Local => "local",
            LoginType::Sso => "sso",
            LoginType::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> LoginType {
        match s {
            "sso" => LoginType::Sso,
            "emergency" => LoginType::Emergency,
            _ => LoginType::Local,
        }
    }
}

/// How a session was closed; `Pending` marks a still-open event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutType {
    ByUser,
    ByInactivity,
    Pending,
}

impl LogoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutType::ByUser => "by_user",
            LogoutType::ByInactivity => "by_inactivity",
            LogoutType::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> LogoutType {
        match s {
            "by_user" => LogoutType::ByUser,
            "by_inactivity" => LogoutType::ByInactivity,
            _ => LogoutType::Pending,
        }
    }
}

/// A registered user/device account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    /// Logical key; not enforced unique by storage, duplicates are resolved
    /// by canonicalization
    pub email: String,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub supervisor_name: Option<String>,
    pub supervisor_phone: Option<String>,
    pub role: Role,
    /// Actor tag of the last mutation ("sso", "admin", "self")
    pub last_mod_by: Option<String>,
    pub last_mod: DateTime<Utc>,
    pub first_login: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub salt: String,
    pub hash: String,
    pub login_attempts: i64,
    pub locked_after: Option<DateTime<Utc>>,
}

/// Fields for a new identity; id and the login timestamps are assigned by
/// the store on insert.
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub email: String,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub supervisor_name: Option<String>,
    pub supervisor_phone: Option<String>,
    pub role: Option<Role>,
    pub last_mod_by: Option<String>,
    pub salt: String,
    pub hash: String,
}

/// One login attempt/session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: i64,
    /// String copy of the identity email, not a foreign key
    pub email: String,
    pub device: String,
    pub login_time: DateTime<Utc>,
    pub login_type: LoginType,
    pub logout_time: Option<DateTime<Utc>>,
    pub logout_type: LogoutType,
}

/// Fields for a new session event; `login_time` defaults to now when unset.
#[derive(Debug, Clone)]
pub struct NewSessionEvent {
    pub email: String,
    pub device: String,
    pub login_time: Option<DateTime<Utc>>,
    pub login_type: LoginType,
}
