//! Content store: posts.

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::like_pattern;
use crate::db::models::{Post, PostType};

/// Filters for a page of posts, newest first.
#[derive(Debug, Clone, Default)]
pub struct PostQuery<'a> {
    pub post_type: Option<PostType>,
    pub search: Option<&'a str>,
    pub author_id: Option<&'a str>,
    pub skip: i64,
    pub limit: i64,
}

pub fn insert(conn: &Connection, post: &Post) -> Result<(), crate::error::AppError> {
    let tags = serde_json::to_string(&post.tags)?;
    conn.execute(
        "INSERT INTO posts (id, post_type, title, content, tags, author_id, author_name, \
         author_username, author_profile_picture, document_url, document_name, job_link, \
         company, location, comments_count, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            post.id,
            post.post_type,
            post.title,
            post.content,
            tags,
            post.author.author_id,
            post.author.author_name,
            post.author.author_username,
            post.author.author_profile_picture,
            post.document_url,
            post.document_name,
            post.job_link,
            post.company,
            post.location,
            post.comments_count,
            post.created_at,
            post.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS);
    conn.query_row(&sql, params![id], Post::from_row).optional()
}

pub fn list(conn: &Connection, query: &PostQuery<'_>) -> rusqlite::Result<Vec<Post>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(post_type) = query.post_type {
        values.push(Box::new(post_type));
        clauses.push(format!("post_type = ?{}", values.len()));
    }
    if let Some(author_id) = query.author_id {
        values.push(Box::new(author_id.to_string()));
        clauses.push(format!("author_id = ?{}", values.len()));
    }
    if let Some(term) = query.search {
        values.push(Box::new(like_pattern(&term.to_lowercase())));
        let n = values.len();
        clauses.push(format!(
            "(fold(title) LIKE ?{n} ESCAPE '\\' \
             OR fold(author_name) LIKE ?{n} ESCAPE '\\' \
             OR fold(author_username) LIKE ?{n} ESCAPE '\\' \
             OR EXISTS (SELECT 1 FROM json_each(posts.tags) t \
                 WHERE fold(t.value) LIKE ?{n} ESCAPE '\\'))"
        ));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    values.push(Box::new(query.limit));
    let limit_idx = values.len();
    values.push(Box::new(query.skip));
    let offset_idx = values.len();

    let sql = format!(
        "SELECT {} FROM posts {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
        Post::COLUMNS,
        where_sql,
        limit_idx,
        offset_idx
    );

    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params_from_iter(values.iter()), Post::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

pub fn increment_comment_count(conn: &Connection, post_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
        params![post_id],
    )
}

/// Patches the denormalized author picture on every post by `username`.
pub fn update_author_picture(
    conn: &Connection,
    username: &str,
    picture_url: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE posts SET author_profile_picture = ?2 WHERE author_username = ?1",
        params![username, picture_url],
    )
}

/// Re-copies each author's current picture onto posts whose copy is stale.
pub fn backfill_author_pictures(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE posts SET author_profile_picture = \
             (SELECT u.profile_picture FROM users u WHERE u.username = posts.author_username) \
         WHERE EXISTS (SELECT 1 FROM users u \
             WHERE u.username = posts.author_username \
             AND u.profile_picture != posts.author_profile_picture)",
        [],
    )
}

#[cfg(test)]
pub(crate) fn sample_post(author: &crate::db::models::User, title: &str, tags: &[&str]) -> Post {
    let now = chrono::Utc::now();
    Post {
        id: uuid::Uuid::now_v7().to_string(),
        post_type: PostType::Threads,
        title: title.to_string(),
        content: format!("{} body", title),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        author: author.author(),
        document_url: None,
        document_name: None,
        job_link: None,
        company: None,
        location: None,
        comments_count: 0,
        created_at: now,
        updated_at: now,
    }
}
