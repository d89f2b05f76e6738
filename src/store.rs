//! JSON-file-backed persistence for tasks, comments, and the activity feed.
//!
//! Each collection is one pretty-printed JSON array under the data
//! directory, loaded wholesale at startup and rewritten after every
//! mutation. Queries are answered from memory. This is deliberately a
//! filtered/sorted table emulation, not a database -- the dashboard's write
//! rate is human-scale.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::now_millis;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// A human-authored task tracked by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub due_date: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub due_date: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Partial task update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_agent: Option<String>,
    pub due_date: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

impl TaskPatch {
    /// Names of the fields this patch touches, for activity metadata.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.assigned_agent.is_some() {
            fields.push("assignedAgent");
        }
        if self.due_date.is_some() {
            fields.push("dueDate");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.metadata.is_some() {
            fields.push("metadata");
        }
        fields
    }
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub author: String,
    pub content: String,
    pub created_at: u64,
}

/// One activity feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: u64,
}

/// Fields accepted when recording an activity entry.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub kind: String,
    pub actor: String,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: Value,
}

/// Aggregate feed statistics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_activities: usize,
    pub by_type: HashMap<String, usize>,
    pub by_actor: HashMap<String, usize>,
    #[serde(rename = "recent24h")]
    pub recent_24h: usize,
}

/// How many actors the stats endpoint reports, most active first.
const STATS_ACTOR_LIMIT: usize = 10;

const DAY_MS: u64 = 86_400_000;

/// The JSON-file store. Owns all three collections; every mutation goes
/// through a method here and rewrites the collection's file before
/// returning.
pub struct Store {
    dir: PathBuf,
    tasks: RwLock<Vec<Task>>,
    comments: RwLock<Vec<Comment>>,
    activity: RwLock<Vec<Activity>>,
}

impl Store {
    /// Open (or create) the data directory and load every collection.
    /// Missing files mean empty collections.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
            path: dir.clone(),
            source,
        })?;
        let store = Self {
            tasks: RwLock::new(load_collection(&dir.join("tasks.json"))?),
            comments: RwLock::new(load_collection(&dir.join("comments.json"))?),
            activity: RwLock::new(load_collection(&dir.join("activity.json"))?),
            dir,
        };
        tracing::info!(dir = %store.dir.display(), "store opened");
        Ok(store)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Tasks matching the optional filters, newest first.
    pub fn list_tasks(&self, status: Option<TaskStatus>, assigned: Option<&str>) -> Vec<Task> {
        let tasks = self.tasks.read();
        let mut matched: Vec<Task> = tasks
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .filter(|t| assigned.is_none_or(|a| t.assigned_agent.as_deref() == Some(a)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let now = now_millis();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            description: new.description,
            status: new.status,
            priority: new.priority,
            assigned_agent: new.assigned_agent,
            created_at: now,
            updated_at: now,
            due_date: new.due_date,
            tags: new.tags,
            metadata: new.metadata.unwrap_or_else(|| Value::Object(Default::default())),
        };
        let mut tasks = self.tasks.write();
        tasks.push(task.clone());
        self.persist("tasks.json", &tasks)?;
        Ok(task)
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assigned) = patch.assigned_agent {
            task.assigned_agent = Some(assigned);
        }
        if let Some(due) = patch.due_date {
            task.due_date = Some(due);
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            task.metadata = metadata;
        }
        task.updated_at = now_millis();

        let updated = task.clone();
        self.persist("tasks.json", &tasks)?;
        Ok(updated)
    }

    /// Delete a task, returning it. Comments are left in place (they are
    /// unreachable through the API once the task is gone).
    pub fn delete_task(&self, id: &str) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write();
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
        let removed = tasks.remove(index);
        self.persist("tasks.json", &tasks)?;
        Ok(removed)
    }

    // ── Comments ───────────────────────────────────────────────────

    /// Comments for one task, oldest first.
    pub fn comments_for(&self, task_id: &str) -> Vec<Comment> {
        let comments = self.comments.read();
        let mut matched: Vec<Comment> = comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched
    }

    pub fn add_comment(
        &self,
        task_id: &str,
        author: &str,
        content: &str,
    ) -> Result<Comment, StoreError> {
        if self.get_task(task_id).is_none() {
            return Err(StoreError::TaskNotFound(task_id.to_string()));
        }
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: now_millis(),
        };
        let mut comments = self.comments.write();
        comments.push(comment.clone());
        self.persist("comments.json", &comments)?;
        Ok(comment)
    }

    // ── Activity feed ──────────────────────────────────────────────

    pub fn append_activity(&self, new: NewActivity) -> Result<Activity, StoreError> {
        let entry = Activity {
            id: Uuid::new_v4().to_string(),
            kind: new.kind,
            actor: new.actor,
            action: new.action,
            target_type: new.target_type,
            target_id: new.target_id,
            metadata: new.metadata,
            timestamp: now_millis(),
        };
        let mut activity = self.activity.write();
        activity.push(entry.clone());
        self.persist("activity.json", &activity)?;
        Ok(entry)
    }

    /// Feed entries, newest first, with paging and an optional kind filter.
    pub fn list_activity(&self, limit: usize, offset: usize, kind: Option<&str>) -> Vec<Activity> {
        let activity = self.activity.read();
        let mut matched: Vec<Activity> = activity
            .iter()
            .filter(|a| kind.is_none_or(|k| a.kind == k))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.into_iter().skip(offset).take(limit).collect()
    }

    pub fn activity_stats(&self) -> ActivityStats {
        let activity = self.activity.read();
        let now = now_millis();

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut actor_counts: HashMap<String, usize> = HashMap::new();
        let mut recent_24h = 0;
        for entry in activity.iter() {
            *by_type.entry(entry.kind.clone()).or_default() += 1;
            *actor_counts.entry(entry.actor.clone()).or_default() += 1;
            if now.saturating_sub(entry.timestamp) < DAY_MS {
                recent_24h += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = actor_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let by_actor = ranked.into_iter().take(STATS_ACTOR_LIMIT).collect();

        ActivityStats {
            total_activities: activity.len(),
            by_type,
            by_actor,
            recent_24h,
        }
    }

    fn persist<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let contents =
            serde_json::to_vec_pretty(items).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?;
        std::fs::write(&path, contents).map_err(|source| StoreError::Write { path, source })
    }
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
