use super::{uuid_column, validate_name};
use crate::database::{opt_uuid, EntityKind, Record, RecordFilter};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub plate_number: String,
    pub brand: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(
        project_id: Uuid,
        name: String,
        plate_number: String,
        brand: String,
        model: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name,
            plate_number,
            brand,
            model,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_name("Vehicle name", &self.name)
    }
}

impl<'r> TryFrom<&Row<'r>> for Vehicle {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(Vehicle {
            id: uuid_column(row, 0)?,
            project_id: uuid_column(row, 1)?,
            name: row.get(2)?,
            plate_number: row.get(3)?,
            brand: row.get(4)?,
            model: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleFilter {
    pub project_id: Option<Uuid>,
}

impl RecordFilter for VehicleFilter {
    const PREDICATE: &'static str = "(?1 IS NULL OR project_id = ?1)";

    fn params(&self) -> Vec<Value> {
        vec![opt_uuid(self.project_id)]
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.project_id
    }
}

impl Record for Vehicle {
    const KIND: EntityKind = EntityKind::Vehicle;
    const TABLE: &'static str = "vehicles";
    const COLUMNS: &'static str = "id, project_id, name, plate_number, brand, model, created_at";
    const ORDER_BY: &'static str = "created_at DESC, rowid DESC";

    type Filter = VehicleFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        Some(self.project_id)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::try_from(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO vehicles (id, project_id, name, plate_number, brand, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                self.id.to_string(),
                self.project_id.to_string(),
                &self.name,
                &self.plate_number,
                &self.brand,
                &self.model,
                self.created_at,
            ),
        )?;
        Ok(())
    }
}
