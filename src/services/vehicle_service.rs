use crate::database::{count_with, get_with, Change, EntityKind, Record, Store};
use crate::error::AppError;
use crate::models::{
    EntityRef, Photo, PhotoFilter, Project, Track, TrackFilter, Vehicle, VehicleFilter,
};
use uuid::Uuid;

/// Creates a vehicle inside an existing project
pub fn create_vehicle(
    store: &Store,
    project_id: Uuid,
    name: String,
    plate_number: String,
    brand: String,
    model: String,
) -> Result<Vehicle, AppError> {
    let vehicle = Vehicle::new(
        project_id,
        name.trim().to_string(),
        plate_number.trim().to_string(),
        brand,
        model,
    );
    vehicle.validate()?;

    store.transaction(|conn, changes| {
        if get_with::<Project>(conn, project_id)?.is_none() {
            return Err(AppError::NotFound("Project".to_string()));
        }
        vehicle.insert(conn)?;
        changes.push(Change::of(&vehicle));
        Ok(())
    })?;

    log::info!("Created vehicle {} in project {}", vehicle.id, project_id);
    Ok(vehicle)
}

pub fn get_vehicle(store: &Store, id: Uuid) -> Result<Vehicle, AppError> {
    store
        .get::<Vehicle>(id)?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
}

/// Vehicles of one project, or of all projects when `project_id` is `None`
pub fn list_vehicles(store: &Store, project_id: Option<Uuid>) -> Result<Vec<Vehicle>, AppError> {
    store.query::<Vehicle>(&VehicleFilter { project_id })
}

/// Deletes a vehicle without tracks or photos
pub fn delete_vehicle(store: &Store, id: Uuid) -> Result<(), AppError> {
    store.transaction(|conn, changes| {
        let vehicle = get_with::<Vehicle>(conn, id)?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;

        let tracks = count_with::<Track>(conn, &TrackFilter { vehicle_id: Some(id) })?;
        let photos = count_with::<Photo>(conn, &PhotoFilter::for_entity(EntityRef::Vehicle(id)))?;
        if tracks > 0 || photos > 0 {
            return Err(AppError::HasChildren(format!(
                "Vehicle '{}' ({} tracks, {} photos)",
                vehicle.name, tracks, photos
            )));
        }

        conn.execute("DELETE FROM vehicles WHERE id = ?1", [id.to_string()])?;
        changes.push(Change::new(EntityKind::Vehicle, id, Some(vehicle.project_id)));
        Ok(())
    })?;

    log::info!("Deleted vehicle {}", id);
    Ok(())
}
