use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RoomType {
    Private,
    Public,
    ReadOnly,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Private => "Private",
            RoomType::Public => "Public",
            RoomType::ReadOnly => "ReadOnly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Private" => Some(RoomType::Private),
            "Public" => Some(RoomType::Public),
            "ReadOnly" => Some(RoomType::ReadOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub online: bool,
    pub roles: Vec<String>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }
}

/// Author snapshot attached to an outbound Message frame. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

impl From<&User> for UserSnapshot {
    fn from(u: &User) -> Self {
        UserSnapshot {
            id: u.id.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    #[serde(rename = "roomType")]
    pub room_type: RoomType,
    pub members: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// The fixed set of command tags a Message or inbound frame can carry.
pub const COMMAND_CREATE_MESSAGE: &str = "CreateMessage";
pub const COMMAND_UPDATE_MESSAGE: &str = "UpdateMessage";
pub const COMMAND_DELETE_MESSAGE: &str = "DeleteMessage";
pub const COMMAND_ADD_USER: &str = "AddUser";
pub const COMMAND_REMOVE_USER: &str = "RemoveUser";
pub const COMMAND_CREATE_ROOM: &str = "CreateRoom";
pub const COMMAND_UPDATE_ROOM: &str = "UpdateRoom";
pub const COMMAND_DELETE_ROOM: &str = "DeleteRoom";
pub const COMMAND_ERROR: &str = "Error";

pub const CHANNEL_GLOBAL: &str = "global";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub text: String,
    pub command: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,
}

impl Message {
    pub fn with_author(mut self, author: Option<&User>) -> Self {
        self.user = author.map(UserSnapshot::from);
        self
    }
}
