//! Identity types: users, accounts, sessions, API tokens, and the
//! request-scoped [`Principal`] built from them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Course-scoped role, totally ordered `_student < _tutor < _lecturer <
/// _maintainer < _owner`. A principal holding role R in course C
/// implicitly holds every role below R in that course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "course_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseRole {
    Student,
    Tutor,
    Lecturer,
    Maintainer,
    Owner,
}

impl CourseRole {
    pub const ALL: [CourseRole; 5] = [
        CourseRole::Student,
        CourseRole::Tutor,
        CourseRole::Lecturer,
        CourseRole::Maintainer,
        CourseRole::Owner,
    ];

    /// Roles at or below `self` in the hierarchy (inclusive).
    pub fn implies(&self) -> impl Iterator<Item = CourseRole> + '_ {
        Self::ALL.into_iter().filter(move |r| r <= self)
    }

    pub fn meets_threshold(&self, threshold: CourseRole) -> bool {
        *self >= threshold
    }

    pub fn as_claim_str(&self) -> &'static str {
        match self {
            CourseRole::Student => "_student",
            CourseRole::Tutor => "_tutor",
            CourseRole::Lecturer => "_lecturer",
            CourseRole::Maintainer => "_maintainer",
            CourseRole::Owner => "_owner",
        }
    }
}

/// A global, non-course-scoped role row (`UserRole` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// An external identity binding: provider URL + provider account id + type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_url: String,
    pub provider_account_id: String,
    pub account_type: String,
}

/// A login session: bearer token is stored only as its hash + prefix,
/// refresh token only as its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id_hash: String,
    pub refresh_token_hash: String,
    pub device_label: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session is alive iff `now < refresh_expires_at` and not ended.
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none() && now < self.refresh_expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_prefix: String,
    pub token_hash: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }
}

/// Claims attached to a [`Principal`]: a general `(resource, action)` set
/// plus course-scoped dependent claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub general: HashSet<(String, String)>,
    /// `resource_kind -> resource_id -> roles held in that resource`.
    pub dependent: HashMap<String, HashMap<Uuid, HashSet<CourseRole>>>,
}

impl Claims {
    pub fn has_general(&self, resource: &str, action: &str) -> bool {
        self.general
            .contains(&(resource.to_string(), action.to_string()))
    }

    /// Highest course role held in `course_id`, if any.
    pub fn course_role(&self, course_id: Uuid) -> Option<CourseRole> {
        self.dependent
            .get("course")
            .and_then(|by_id| by_id.get(&course_id))
            .and_then(|roles| roles.iter().max().copied())
    }

    pub fn grant_course_role(&mut self, course_id: Uuid, role: CourseRole) {
        let by_id = self.dependent.entry("course".to_string()).or_default();
        let roles = by_id.entry(course_id).or_default();
        roles.extend(role.implies());
    }
}

/// Transient, request-scoped authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub roles: Vec<String>,
    pub claims: Claims,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
            roles: Vec::new(),
            claims: Claims::default(),
        }
    }

    /// `is_admin := "_admin" ∈ roles ∨ ("_admin", *) ∈ claims.general`.
    pub fn recompute_is_admin(&mut self) {
        self.is_admin = self.roles.iter().any(|r| r == "_admin")
            || self
                .claims
                .general
                .iter()
                .any(|(resource, _)| resource == "_admin");
    }

    pub fn course_role(&self, course_id: Uuid) -> Option<CourseRole> {
        self.claims.course_role(course_id)
    }

    pub fn has_course_role_at_least(&self, course_id: Uuid, threshold: CourseRole) -> bool {
        self.is_admin
            || self
                .course_role(course_id)
                .map(|role| role.meets_threshold(threshold))
                .unwrap_or(false)
    }
}
