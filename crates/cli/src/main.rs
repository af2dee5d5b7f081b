use clap::{Parser, Subcommand};
use clinica_core::{AccessContext, CoreConfig, NewStaffUser, Store};
use clinica_types::Role;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinica")]
#[command(about = "Clinic management system CLI")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, default_value = "clinica.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema
    InitDb,
    /// Create an administrator account
    CreateAdmin {
        /// Login username
        username: String,
        /// Login password
        password: String,
        /// Display name
        #[arg(long)]
        full_name: Option<String>,
        /// Contact email
        #[arg(long)]
        email: Option<String>,
    },
    /// Add a clinic room
    AddClinic {
        /// Clinic name
        name: String,
    },
    /// Assign a physician to a clinic (omit --clinic to clear)
    AssignClinic {
        /// Staff user id of the physician
        physician_id: i64,
        /// Clinic id
        #[arg(long)]
        clinic: Option<i64>,
    },
    /// List staff accounts
    ListStaff,
    /// List clinics and their availability
    ListClinics,
    /// List registered patients
    ListPatients,
}

/// Local administrative identity for CLI operations.
///
/// The CLI runs with direct database access, so commands act as an
/// administrator without an account of their own.
fn operator() -> AccessContext {
    AccessContext {
        user_id: 0,
        role: Role::Admin,
        current_clinic: None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = Arc::new(CoreConfig::new(cli.database)?);
    let store = Store::open(cfg)?;

    match cli.command {
        Commands::InitDb => {
            println!("Database initialised.");
        }
        Commands::CreateAdmin {
            username,
            password,
            full_name,
            email,
        } => {
            let user = store.create_staff_user(NewStaffUser {
                full_name: full_name.unwrap_or_else(|| username.clone()),
                username,
                email,
                password,
            })?;
            store.change_role(&operator(), user.id, Role::Admin)?;
            println!("Created administrator {} (id {}).", user.username, user.id);
        }
        Commands::AddClinic { name } => {
            let clinic = store.create_clinic(&operator(), &name)?;
            println!("Created clinic {} (id {}).", clinic.name, clinic.id);
        }
        Commands::AssignClinic {
            physician_id,
            clinic,
        } => {
            store.assign_clinic(&operator(), physician_id, clinic)?;
            match clinic {
                Some(clinic) => println!("Assigned physician {} to clinic {}.", physician_id, clinic),
                None => println!("Cleared clinic for physician {}.", physician_id),
            }
        }
        Commands::ListStaff => {
            let staff = store.list_staff()?;
            if staff.is_empty() {
                println!("No staff accounts found.");
            } else {
                for user in staff {
                    println!(
                        "ID: {}, Username: {}, Name: {}, Role: {}, Active: {}, Clinic: {}",
                        user.id,
                        user.username,
                        user.full_name,
                        user.role,
                        user.active,
                        user.current_clinic_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
        }
        Commands::ListClinics => {
            let clinics = store.list_clinics()?;
            if clinics.is_empty() {
                println!("No clinics found.");
            } else {
                for clinic in clinics {
                    println!(
                        "ID: {}, Name: {}, {}",
                        clinic.id,
                        clinic.name,
                        if clinic.available { "available" } else { "occupied" }
                    );
                }
            }
        }
        Commands::ListPatients => {
            let patients = store.list_patients(clinica_core::Visibility::Global)?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "ID: {}, Name: {}, Registered: {}",
                        patient.id,
                        patient.full_name,
                        patient.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
    }

    Ok(())
}
