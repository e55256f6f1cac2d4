//! Shared entity fixtures for repository tests.

#![allow(dead_code)]

use modelstore_core::{field, nested_entity, record_enum, Entity, EntityId, Field};

record_enum! {
    /// Account lifecycle state, stored by its integer value.
    pub enum UserStatus: i64 {
        Created = 0,
        Confirmed = 1,
        Banned = 2,
    }
}

record_enum! {
    /// Publication state, stored by its text value.
    pub enum PostStatus: str {
        Draft = "draft",
        Published = "published",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    id: EntityId,
    pub name: String,
    pub password: String,
    pub status: UserStatus,
}

impl User {
    pub fn new(name: &str, password: &str, status: UserStatus) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.to_string(),
            password: password.to_string(),
            status,
        }
    }
}

impl Entity for User {
    const TYPE_NAME: &'static str = "User";
    const FIELDS: &'static [Field<Self>] = &[
        field!(User, name: String),
        field!(User, password: String),
        field!(User, status: UserStatus),
    ];

    fn blank(id: EntityId) -> Self {
        Self {
            id,
            name: String::new(),
            password: String::new(),
            status: UserStatus::Created,
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    id: EntityId,
    pub title: String,
    pub text: Option<String>,
    pub status: PostStatus,
    pub tags: Vec<String>,
}

impl Post {
    pub fn new(title: &str, status: PostStatus) -> Self {
        Self {
            title: title.to_string(),
            status,
            ..Self::blank(EntityId::generate())
        }
    }
}

impl Entity for Post {
    const TYPE_NAME: &'static str = "Post";
    const FIELDS: &'static [Field<Self>] = &[
        field!(Post, title: String),
        field!(Post, text: Option<String>),
        field!(Post, status: PostStatus),
        field!(Post, tags: Vec<String>),
    ];

    fn blank(id: EntityId) -> Self {
        Self {
            id,
            title: String::new(),
            text: None,
            status: PostStatus::Draft,
            tags: Vec::new(),
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    id: EntityId,
    pub city: String,
    pub zip: String,
}

impl Address {
    pub fn new(city: &str, zip: &str) -> Self {
        Self {
            id: EntityId::generate(),
            city: city.to_string(),
            zip: zip.to_string(),
        }
    }
}

impl Entity for Address {
    const TYPE_NAME: &'static str = "Address";
    const FIELDS: &'static [Field<Self>] = &[
        field!(Address, city: String),
        field!(Address, zip: String),
    ];

    fn blank(id: EntityId) -> Self {
        Self {
            id,
            city: String::new(),
            zip: String::new(),
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }
}

nested_entity!(Address);

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    id: EntityId,
    pub nickname: String,
    pub score: f64,
    pub visits: i64,
    pub verified: bool,
    pub home: Option<Address>,
}

impl Profile {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            ..Self::blank(EntityId::generate())
        }
    }
}

impl Entity for Profile {
    const TYPE_NAME: &'static str = "Profile";
    const FIELDS: &'static [Field<Self>] = &[
        field!(Profile, nickname: String),
        field!(Profile, score: f64),
        field!(Profile, visits: i64),
        field!(Profile, verified: bool),
        field!(Profile, home: Option<Address>),
    ];

    fn blank(id: EntityId) -> Self {
        Self {
            id,
            nickname: String::new(),
            score: 0.0,
            visits: 0,
            verified: false,
            home: None,
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// The two-user fixture most scenarios start from.
pub fn bob_and_alice() -> (User, User) {
    (
        User::new("bob", "111", UserStatus::Created),
        User::new("alice", "222", UserStatus::Confirmed),
    )
}
