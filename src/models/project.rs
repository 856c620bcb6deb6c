use super::{uuid_column, validate_name};
use crate::database::{opt_text, EntityKind, Record, RecordFilter};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top level survey container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub cover_photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            cover_photo_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_name("Project name", &self.name)
    }
}

impl<'r> TryFrom<&Row<'r>> for Project {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(Project {
            id: uuid_column(row, 0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            cover_photo_path: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFilter {
    pub name: Option<String>,
}

impl RecordFilter for ProjectFilter {
    const PREDICATE: &'static str = "(?1 IS NULL OR name = ?1)";

    fn params(&self) -> Vec<Value> {
        vec![opt_text(self.name.as_deref())]
    }
}

impl Record for Project {
    const KIND: EntityKind = EntityKind::Project;
    const TABLE: &'static str = "projects";
    const COLUMNS: &'static str =
        "id, name, description, cover_photo_path, created_at, updated_at";
    const ORDER_BY: &'static str = "created_at DESC, rowid DESC";

    type Filter = ProjectFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        None
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::try_from(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO projects (id, name, description, cover_photo_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                self.id.to_string(),
                &self.name,
                &self.description,
                &self.cover_photo_path,
                self.created_at,
                self.updated_at,
            ),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project() {
        let project = Project::new("Bridge A7".to_string(), "north span".to_string());
        assert_eq!(project.name, "Bridge A7");
        assert!(project.cover_photo_path.is_none());
        assert_eq!(project.created_at, project.updated_at);
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let project = Project::new("  ".to_string(), String::new());
        assert!(matches!(project.validate(), Err(AppError::Validation(_))));
    }
}
