use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Free,
    Premium,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    /// Lenient parse for values written by older clients (`USER`, `ADMIN`).
    /// Anything unrecognised falls back to `Free`.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(Self::Free)
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" | "user" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            "admin" => Ok(Self::Admin),
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Channel access --

/// Who may see and who may post in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Open,
    ReadOnly,
    AdminOnly,
    Premium,
    Support,
    Staff,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::ReadOnly => "read-only",
            Self::AdminOnly => "admin-only",
            Self::Premium => "premium",
            Self::Support => "support",
            Self::Staff => "staff",
        }
    }

    pub fn can_view(&self, role: Role) -> bool {
        match self {
            Self::Open | Self::ReadOnly | Self::Support => true,
            Self::Premium => role == Role::Premium || role.is_admin(),
            Self::AdminOnly | Self::Staff => role.is_admin(),
        }
    }

    pub fn can_post(&self, role: Role) -> bool {
        match self {
            Self::Open | Self::Support => true,
            Self::ReadOnly | Self::AdminOnly | Self::Staff => role.is_admin(),
            Self::Premium => role == Role::Premium || role.is_admin(),
        }
    }
}

impl FromStr for AccessLevel {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "free" => Ok(Self::Open),
            "read-only" | "readonly" => Ok(Self::ReadOnly),
            "admin-only" | "admin" => Ok(Self::AdminOnly),
            "premium" => Ok(Self::Premium),
            "support" => Ok(Self::Support),
            "staff" => Ok(Self::Staff),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

// -- Subscriptions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
        }
    }

    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("active") => Self::Active,
            Some("expired") => Self::Expired,
            _ => Self::Inactive,
        }
    }
}

// -- Admin capabilities --

macro_rules! capabilities {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Capability {
            $($variant),+
        }

        impl Capability {
            const ALL: &'static [Capability] = &[$(Capability::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl FromStr for Capability {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(UnknownValue(s.to_string())),
                }
            }
        }
    };
}

capabilities! {
    DeleteMessages => "delete_messages",
    EditMessages => "edit_messages",
    ViewAllMessages => "view_all_messages",
    CreateChannels => "create_channels",
    DeleteChannels => "delete_channels",
    EditChannels => "edit_channels",
    ManageChannelAccess => "manage_channel_access",
    ViewUsers => "view_users",
    EditUsers => "edit_users",
    BanUsers => "ban_users",
    UnbanUsers => "unban_users",
    AssignRoles => "assign_roles",
    ViewUserDetails => "view_user_details",
    ManageCourses => "manage_courses",
    ManageAnnouncements => "manage_announcements",
    ModerateContent => "moderate_content",
    ViewAnalytics => "view_analytics",
    ManageSettings => "manage_settings",
    ViewLogs => "view_logs",
    ManageSubscriptions => "manage_subscriptions",
    ViewSupportTickets => "view_support_tickets",
    RespondToTickets => "respond_to_tickets",
    CloseTickets => "close_tickets",
    CreateAdmins => "create_admins",
    DeleteAdmins => "delete_admins",
    EditAdminPermissions => "edit_admin_permissions",
    ViewAdminActivity => "view_admin_activity",
    ManageSystemSettings => "manage_system_settings",
    ManageDatabase => "manage_database",
    ManageIntegrations => "manage_integrations",
    ViewSystemLogs => "view_system_logs",
    ManageBackups => "manage_backups",
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        Self::ALL
    }

    /// Capabilities an admin gets when none were assigned explicitly.
    pub fn admin_defaults() -> &'static [Capability] {
        &[
            Self::DeleteMessages,
            Self::EditMessages,
            Self::ViewAllMessages,
            Self::CreateChannels,
            Self::DeleteChannels,
            Self::EditChannels,
            Self::ViewUsers,
            Self::ViewUserDetails,
            Self::ModerateContent,
            Self::ViewSupportTickets,
            Self::RespondToTickets,
            Self::CloseTickets,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_legacy_names() {
        assert_eq!("USER".parse::<Role>(), Ok(Role::Free));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("super_admin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!(Role::parse_lenient("moderator"), Role::Free);
    }

    #[test]
    fn access_levels_gate_posting() {
        assert!(AccessLevel::Open.can_post(Role::Free));
        assert!(AccessLevel::ReadOnly.can_view(Role::Free));
        assert!(!AccessLevel::ReadOnly.can_post(Role::Premium));
        assert!(AccessLevel::ReadOnly.can_post(Role::Admin));
        assert!(!AccessLevel::AdminOnly.can_view(Role::Premium));
        assert!(AccessLevel::Premium.can_post(Role::Premium));
        assert!(!AccessLevel::Premium.can_view(Role::Free));
        assert!(AccessLevel::Staff.can_post(Role::SuperAdmin));
    }

    #[test]
    fn access_level_serializes_kebab_case() {
        let json = serde_json::to_string(&AccessLevel::AdminOnly).unwrap();
        assert_eq!(json, "\"admin-only\"");
        assert_eq!("readonly".parse::<AccessLevel>(), Ok(AccessLevel::ReadOnly));
    }

    #[test]
    fn capability_names_round_trip_through_from_str() {
        assert_eq!(Capability::all().len(), 32);
        for cap in Capability::all() {
            assert_eq!(cap.as_str().parse::<Capability>(), Ok(*cap));
        }
        assert!("launch_rockets".parse::<Capability>().is_err());
    }
}
