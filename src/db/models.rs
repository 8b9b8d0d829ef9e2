use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stored account. Holds the password hash, so it is never serialized directly.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub profile_picture: String,
    pub password_hash: String,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub profile_picture: String,
    pub created_at: DateTime<Utc>,
}

/// Author fields copied onto posts and comments at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub author_id: String,
    pub author_name: String,
    pub author_username: String,
    pub author_profile_picture: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Notes,
    Jobs,
    Threads,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub post_type: PostType,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub author: Author,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub job_link: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_comment_id: Option<String>,
    pub content: String,
    #[serde(flatten)]
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub const COLUMNS: &'static str = "id, email, username, name, bio, profile_picture, \
         password_hash, reset_token, reset_token_expires, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            username: row.get("username")?,
            name: row.get("name")?,
            bio: row.get("bio")?,
            profile_picture: row.get("profile_picture")?,
            password_hash: row.get("password_hash")?,
            reset_token: row.get("reset_token")?,
            reset_token_expires: row.get("reset_token_expires")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            name: self.name.clone(),
            bio: self.bio.clone(),
            profile_picture: self.profile_picture.clone(),
            created_at: self.created_at,
        }
    }

    pub fn author(&self) -> Author {
        Author {
            author_id: self.id.clone(),
            author_name: self.name.clone(),
            author_username: self.username.clone(),
            author_profile_picture: self.profile_picture.clone(),
        }
    }
}

impl Author {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            author_id: row.get("author_id")?,
            author_name: row.get("author_name")?,
            author_username: row.get("author_username")?,
            author_profile_picture: row.get("author_profile_picture")?,
        })
    }
}

impl Post {
    pub const COLUMNS: &'static str = "id, post_type, title, content, tags, author_id, \
         author_name, author_username, author_profile_picture, document_url, document_name, \
         job_link, company, location, comments_count, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags_json: String = row.get("tags")?;
        let tags = serde_json::from_str(&tags_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get("id")?,
            post_type: row.get("post_type")?,
            title: row.get("title")?,
            content: row.get("content")?,
            tags,
            author: Author::from_row(row)?,
            document_url: row.get("document_url")?,
            document_name: row.get("document_name")?,
            job_link: row.get("job_link")?,
            company: row.get("company")?,
            location: row.get("location")?,
            comments_count: row.get("comments_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Comment {
    pub const COLUMNS: &'static str = "id, post_id, parent_comment_id, content, author_id, \
         author_name, author_username, author_profile_picture, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            parent_comment_id: row.get("parent_comment_id")?,
            content: row.get("content")?,
            author: Author::from_row(row)?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Notes => "notes",
            PostType::Jobs => "jobs",
            PostType::Threads => "threads",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown post type '{0}' (expected notes, jobs or threads)")]
pub struct UnknownPostType(pub String);

impl FromStr for PostType {
    type Err = UnknownPostType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notes" => Ok(PostType::Notes),
            "jobs" => Ok(PostType::Jobs),
            "threads" => Ok(PostType::Threads),
            other => Err(UnknownPostType(other.to_string())),
        }
    }
}

impl ToSql for PostType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<PostType>()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_type_round_trips_through_str() {
        for kind in [PostType::Notes, PostType::Jobs, PostType::Threads] {
            assert_eq!(kind.as_str().parse::<PostType>().unwrap(), kind);
        }
        assert!("events".parse::<PostType>().is_err());
        assert!("Notes".parse::<PostType>().is_err());
    }

    #[test]
    fn post_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PostType::Jobs).unwrap(), "\"jobs\"");
    }

    #[test]
    fn post_serializes_author_fields_flat() {
        let now = Utc::now();
        let post = Post {
            id: "p1".into(),
            post_type: PostType::Threads,
            title: "Study group".into(),
            content: "Anyone?".into(),
            tags: vec!["math".into()],
            author: Author {
                author_id: "u1".into(),
                author_name: "Ada".into(),
                author_username: "ada".into(),
                author_profile_picture: String::new(),
            },
            document_url: None,
            document_name: None,
            job_link: None,
            company: None,
            location: None,
            comments_count: 0,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["author_username"], "ada");
        assert_eq!(json["post_type"], "threads");
        assert!(json.get("author").is_none());
    }

    #[test]
    fn profile_omits_password_hash() {
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            email: "ada@example.com".into(),
            username: "ada".into(),
            name: "Ada".into(),
            bio: String::new(),
            profile_picture: String::new(),
            password_hash: "$2b$secret".into(),
            reset_token: None,
            reset_token_expires: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&user.profile()).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
    }
}
