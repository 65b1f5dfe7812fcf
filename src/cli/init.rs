use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::users::{create_user, find_user};

pub fn run(data_dir: Option<String>, user: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let effective = settings.clone().with_env_overrides();
    let resolved = effective.data_path();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(effective.backup_dir())?;

    let conn = get_connection(&effective.db_path())?;
    init_db(&conn)?;

    if let Some(name) = user {
        let user = match find_user(&conn, &name)? {
            Some(existing) => existing,
            None => {
                let created = create_user(&conn, &name, None)?;
                println!("Created user {}", created.username);
                created
            }
        };
        settings.active_user = Some(user.username);
    }

    save_settings(&settings)?;
    println!("Initialized tally at {}", resolved.display());
    if let Some(active) = &settings.active_user {
        println!("Active user: {active}");
    }
    Ok(())
}
