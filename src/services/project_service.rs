use crate::database::{count_with, get_with, Change, EntityKind, Store};
use crate::error::AppError;
use crate::models::{EntityRef, Photo, PhotoFilter, Project, ProjectFilter, Vehicle, VehicleFilter};
use uuid::Uuid;

/// Creates a new project
pub fn create_project(store: &Store, name: String, description: String) -> Result<Project, AppError> {
    let project = Project::new(name.trim().to_string(), description);
    project.validate()?;
    store.put(&project)?;
    log::info!("Created project {} ({})", project.name, project.id);
    Ok(project)
}

/// Loads a project by id
pub fn get_project(store: &Store, id: Uuid) -> Result<Project, AppError> {
    store
        .get::<Project>(id)?
        .ok_or_else(|| AppError::NotFound("Project".to_string()))
}

/// All projects, newest first
pub fn list_projects(store: &Store) -> Result<Vec<Project>, AppError> {
    store.query::<Project>(&ProjectFilter::default())
}

/// Deletes a project without vehicles or photos
pub fn delete_project(store: &Store, id: Uuid) -> Result<(), AppError> {
    store.transaction(|conn, changes| {
        let project = get_with::<Project>(conn, id)?
            .ok_or_else(|| AppError::NotFound("Project".to_string()))?;

        let vehicles = count_with::<Vehicle>(conn, &VehicleFilter { project_id: Some(id) })?;
        let photos = count_with::<Photo>(conn, &PhotoFilter::for_entity(EntityRef::Project(id)))?;
        if vehicles > 0 || photos > 0 {
            return Err(AppError::HasChildren(format!(
                "Project '{}' ({} vehicles, {} photos)",
                project.name, vehicles, photos
            )));
        }

        conn.execute("DELETE FROM projects WHERE id = ?1", [id.to_string()])?;
        changes.push(Change::new(EntityKind::Project, id, None));
        Ok(())
    })?;

    log::info!("Deleted project {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vehicle_service;

    #[test]
    fn test_create_and_get_project() {
        let store = Store::open_in_memory().unwrap();
        let project = create_project(&store, "  Depot Nord ".to_string(), "yard".to_string()).unwrap();
        assert_eq!(project.name, "Depot Nord");

        let loaded = get_project(&store, project.id).unwrap();
        assert_eq!(loaded, project);
        assert!(matches!(get_project(&store, Uuid::new_v4()), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            create_project(&store, " ".to_string(), String::new()),
            Err(AppError::Validation(_))
        ));
        assert!(list_projects(&store).unwrap().is_empty());
    }

    #[test]
    fn test_delete_rejected_while_vehicles_exist() {
        let store = Store::open_in_memory().unwrap();
        let project = create_project(&store, "P".to_string(), String::new()).unwrap();
        let vehicle = vehicle_service::create_vehicle(
            &store,
            project.id,
            "Truck".to_string(),
            String::new(),
            String::new(),
            String::new(),
        )
        .unwrap();

        assert!(matches!(
            delete_project(&store, project.id),
            Err(AppError::HasChildren(_))
        ));

        vehicle_service::delete_vehicle(&store, vehicle.id).unwrap();
        delete_project(&store, project.id).unwrap();
        assert!(list_projects(&store).unwrap().is_empty());
    }
}
