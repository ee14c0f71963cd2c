use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use census_db::audit::ActivityLogFilter;
use census_db::census::{
    load_sample_data, GeographicalInfo, Household, Housing, Individual, IndividualSearch, Page, Sex,
};
use census_db::config::DatabaseLocation;
use census_db::db::{Filter, OperationKind, Table};
use census_db::{CensusConfig, CensusService, Db};

#[derive(Parser)]
#[command(name = "census")]
#[command(about = "Census data entry, reports and activity log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (memory:// or file://path/to/census.sqlite)
    #[arg(long = "database-url", env = "CENSUS_DATABASE_URL", default_value = "file://census.sqlite")]
    database: String,

    /// User recorded in the activity log and on created or modified records
    #[arg(long, env = "CENSUS_USER")]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage geographical information
    #[command(subcommand)]
    Geo(GeoCommands),
    /// Manage households
    #[command(subcommand)]
    Household(HouseholdCommands),
    /// Manage individuals
    #[command(subcommand)]
    Individual(IndividualCommands),
    /// Manage housing information
    #[command(subcommand)]
    Housing(HousingCommands),
    /// View analytics and reports
    #[command(subcommand)]
    Analytics(AnalyticsCommands),
    /// Search census data
    #[command(subcommand)]
    Search(SearchCommands),
    /// Show record counts for the main tables
    Stats,
    /// Show recent activity log entries, newest first
    Activity {
        /// Only entries for this table, e.g. INDIVIDUAL
        #[arg(long)]
        table: Option<String>,
        /// Only INSERT, UPDATE or DELETE entries
        #[arg(long)]
        operation: Option<String>,
        /// Only entries made by this user
        #[arg(long = "user")]
        by_user: Option<String>,
        /// How many days back to look
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Load a small sample data set
    Sample,
}

#[derive(Subcommand)]
enum GeoCommands {
    Create {
        #[arg(long)]
        region: String,
        #[arg(long)]
        district: String,
        #[arg(long)]
        district_type: Option<String>,
        #[arg(long)]
        locality: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    List {
        #[arg(long)]
        geo_id: Option<i64>,
    },
}

#[derive(Subcommand)]
enum HouseholdCommands {
    Create {
        #[arg(long)]
        geo_id: i64,
        #[arg(long)]
        household_number: Option<String>,
        #[arg(long)]
        residence_type: Option<String>,
        #[arg(long)]
        form_number: Option<String>,
    },
    List {
        #[arg(long)]
        household_id: Option<i64>,
        #[arg(long)]
        geo_id: Option<i64>,
    },
}

#[derive(Subcommand)]
enum IndividualCommands {
    Create {
        #[arg(long)]
        household_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        relationship: Option<String>,
        #[arg(long, value_parser = ["M", "F"])]
        sex: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        nationality: Option<String>,
        #[arg(long)]
        ethnicity: Option<String>,
        #[arg(long)]
        religion: Option<String>,
        #[arg(long)]
        marital_status: Option<String>,
        #[arg(long)]
        education: Option<String>,
    },
    List {
        #[arg(long)]
        individual_id: Option<i64>,
        #[arg(long)]
        household_id: Option<i64>,
    },
}

#[derive(Subcommand)]
enum HousingCommands {
    Create {
        #[arg(long)]
        household_id: i64,
        #[arg(long)]
        dwelling_type: Option<String>,
        #[arg(long)]
        wall_material: Option<String>,
        #[arg(long)]
        floor_material: Option<String>,
        #[arg(long)]
        roof_material: Option<String>,
        #[arg(long)]
        rooms: Option<i64>,
        #[arg(long)]
        lighting: Option<String>,
        #[arg(long)]
        water_source: Option<String>,
        #[arg(long)]
        toilet_type: Option<String>,
    },
    List {
        #[arg(long)]
        household_id: Option<i64>,
    },
}

#[derive(Subcommand)]
enum AnalyticsCommands {
    /// Show the members and totals of one household
    Demographics {
        #[arg(long)]
        household_id: i64,
    },
    /// Show population per region and district
    Regions {
        #[arg(long)]
        region: Option<String>,
    },
    /// Show housing units per district and dwelling type
    HousingConditions {
        #[arg(long)]
        district: Option<String>,
    },
}

#[derive(Subcommand)]
enum SearchCommands {
    /// Search individuals with filters
    Individuals(SearchArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    district: Option<String>,
    #[arg(long, value_parser = ["M", "F"])]
    sex: Option<String>,
    #[arg(long)]
    min_age: Option<i64>,
    #[arg(long)]
    max_age: Option<i64>,
    #[arg(long)]
    marital_status: Option<String>,
    #[arg(long)]
    education: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    size: u32,
}

fn parse_sex(sex: Option<&str>) -> Option<Sex> {
    match sex {
        Some("M") => Some(Sex::Male),
        Some("F") => Some(Sex::Female),
        _ => None,
    }
}

/// Filter on a single id if given, otherwise on a parent column, otherwise all rows.
fn id_or_parent(id: Option<i64>, parent: &str, parent_id: Option<i64>) -> Filter {
    match (id, parent_id) {
        (Some(id), _) => Filter::Id(id),
        (None, Some(parent_id)) => Filter::eq(parent, parent_id),
        (None, None) => Filter::All,
    }
}

fn open(cli: &Cli) -> Result<CensusService> {
    let mut config = CensusConfig::from_env()?;
    config.database = DatabaseLocation::parse(&cli.database)?;
    if let Some(user) = &cli.user {
        config.user_name = user.clone();
    }
    let db = Db::open_with_config(&config).context("Failed to open census database")?;
    Ok(CensusService::new(db))
}

fn geo(service: &CensusService, command: &GeoCommands) -> Result<()> {
    match command {
        GeoCommands::Create { region, district, district_type, locality, address, phone } => {
            let id = service.create(&GeographicalInfo {
                region_name: region.clone(),
                district_name: district.clone(),
                district_type: district_type.clone(),
                locality_name: locality.clone(),
                detailed_address: address.clone(),
                contact_phone_1: phone.clone(),
                ..Default::default()
            })?;
            println!("Created geographical information {}", id);
        }
        GeoCommands::List { geo_id } => {
            let areas: Vec<GeographicalInfo> = service.list(&id_or_parent(*geo_id, "geo_id", None))?;
            println!("{:<6} {:<20} {:<24} {}", "ID", "Region", "District", "Locality");
            for area in areas {
                println!(
                    "{:<6} {:<20} {:<24} {}",
                    area.geo_id.unwrap_or_default(),
                    area.region_name,
                    area.district_name,
                    area.locality_name.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn household(service: &CensusService, command: &HouseholdCommands) -> Result<()> {
    match command {
        HouseholdCommands::Create { geo_id, household_number, residence_type, form_number } => {
            let id = service.create(&Household {
                household_number_in_structure: household_number.clone(),
                type_of_residence: residence_type.clone(),
                form_number: form_number.clone(),
                interview_date_started: Some(Utc::now().date_naive().to_string()),
                ..Household::new(*geo_id)
            })?;
            println!("Created household {}", id);
        }
        HouseholdCommands::List { household_id, geo_id } => {
            let households: Vec<Household> = service.list(&id_or_parent(*household_id, "geo_id", *geo_id))?;
            println!("{:<6} {:<6} {:<10} {:>7} {:>5} {:>7}", "ID", "Geo", "Number", "Members", "Males", "Females");
            for h in households {
                println!(
                    "{:<6} {:<6} {:<10} {:>7} {:>5} {:>7}",
                    h.household_id.unwrap_or_default(),
                    h.geo_id,
                    h.household_number_in_structure.unwrap_or_default(),
                    h.total_members,
                    h.total_males,
                    h.total_females
                );
            }
        }
    }
    Ok(())
}

fn individual(service: &CensusService, command: &IndividualCommands) -> Result<()> {
    match command {
        IndividualCommands::Create {
            household_id,
            name,
            relationship,
            sex,
            age,
            nationality,
            ethnicity,
            religion,
            marital_status,
            education,
        } => {
            let id = service.create(&Individual {
                relationship_to_head: relationship.clone(),
                sex: parse_sex(sex.as_deref()),
                age: *age,
                nationality: nationality.clone(),
                ethnicity: ethnicity.clone(),
                religion: religion.clone(),
                marital_status: marital_status.clone(),
                highest_education_level: education.clone(),
                ..Individual::new(*household_id, name, Sex::Male, 0)
            })?;
            println!("Created individual {}", id);
        }
        IndividualCommands::List { individual_id, household_id } => {
            let people: Vec<Individual> =
                service.list(&id_or_parent(*individual_id, "household_id", *household_id))?;
            println!("{:<6} {:<9} {:<24} {:<3} {:>4}  {}", "ID", "Household", "Name", "Sex", "Age", "Relationship");
            for person in people {
                println!(
                    "{:<6} {:<9} {:<24} {:<3} {:>4}  {}",
                    person.individual_id.unwrap_or_default(),
                    person.household_id,
                    person.full_name,
                    person.sex.map(|s| s.as_str()).unwrap_or_default(),
                    person.age.map(|a| a.to_string()).unwrap_or_default(),
                    person.relationship_to_head.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn housing(service: &CensusService, command: &HousingCommands) -> Result<()> {
    match command {
        HousingCommands::Create {
            household_id,
            dwelling_type,
            wall_material,
            floor_material,
            roof_material,
            rooms,
            lighting,
            water_source,
            toilet_type,
        } => {
            let id = service.create(&Housing {
                household_id: *household_id,
                dwelling_type: dwelling_type.clone(),
                outer_wall_material: wall_material.clone(),
                floor_material: floor_material.clone(),
                roof_material: roof_material.clone(),
                rooms_occupied: *rooms,
                main_lighting_source: lighting.clone(),
                main_drinking_water_source: water_source.clone(),
                toilet_facility_type: toilet_type.clone(),
                ..Default::default()
            })?;
            println!("Created housing record {}", id);
        }
        HousingCommands::List { household_id } => {
            let units: Vec<Housing> = service.list(&id_or_parent(None, "household_id", *household_id))?;
            println!("{:<6} {:<9} {:<20} {:>5}  {}", "ID", "Household", "Dwelling", "Rooms", "Water source");
            for unit in units {
                println!(
                    "{:<6} {:<9} {:<20} {:>5}  {}",
                    unit.housing_id.unwrap_or_default(),
                    unit.household_id,
                    unit.dwelling_type.unwrap_or_default(),
                    unit.rooms_occupied.map(|r| r.to_string()).unwrap_or_default(),
                    unit.main_drinking_water_source.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn analytics(service: &CensusService, command: &AnalyticsCommands) -> Result<()> {
    match command {
        AnalyticsCommands::Demographics { household_id } => {
            let household = service.household_demographics(*household_id)?;
            println!(
                "Household {} in {}, {}{}",
                household.household_id,
                household.district_name,
                household.region_name,
                household.locality_name.map(|l| format!(" ({})", l)).unwrap_or_default()
            );
            println!(
                "Members: {} ({} male, {} female)",
                household.total_members, household.total_males, household.total_females
            );
            for member in household.members {
                println!(
                    "  #{:<6} {:<24} {:<2} {:>4}  {}",
                    member.individual_id,
                    member.full_name,
                    member.sex.unwrap_or_default(),
                    member.age.map(|a| a.to_string()).unwrap_or_default(),
                    member.relationship_to_head.unwrap_or_default()
                );
            }
        }
        AnalyticsCommands::Regions { region } => {
            let regions = service.regional_statistics(region.as_deref())?;
            println!(
                "{:<20} {:<24} {:>10} {:>10} {:>8} {:>8} {:>8}",
                "Region", "District", "Households", "Population", "Males", "Females", "Avg age"
            );
            for r in regions {
                println!(
                    "{:<20} {:<24} {:>10} {:>10} {:>8} {:>8} {:>8}",
                    r.region_name,
                    r.district_name,
                    r.households,
                    r.population,
                    r.males,
                    r.females,
                    r.average_age.map(|a| format!("{:.1}", a)).unwrap_or_else(|| "-".to_string())
                );
            }
        }
        AnalyticsCommands::HousingConditions { district } => {
            let conditions = service.housing_conditions(district.as_deref())?;
            println!(
                "{:<20} {:<24} {:<20} {:>6} {:>9} {:>9} {:>7}",
                "Region", "District", "Dwelling", "Units", "Occupants", "Avg rooms", "Toilet"
            );
            for c in conditions {
                println!(
                    "{:<20} {:<24} {:<20} {:>6} {:>9} {:>9} {:>7}",
                    c.region_name,
                    c.district_name,
                    c.dwelling_type.unwrap_or_else(|| "-".to_string()),
                    c.housing_units,
                    c.occupants,
                    c.average_rooms.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".to_string()),
                    c.with_toilet
                );
            }
        }
    }
    Ok(())
}

fn search(service: &CensusService, command: &SearchCommands) -> Result<()> {
    let SearchCommands::Individuals(args) = command;
    let filters = IndividualSearch {
        region_name: args.region.clone(),
        district_name: args.district.clone(),
        sex: parse_sex(args.sex.as_deref()),
        min_age: args.min_age,
        max_age: args.max_age,
        marital_status: args.marital_status.clone(),
        education_level: args.education.clone(),
    };
    let results = service.search_individuals(&filters, Page::new(args.page, args.size))?;

    println!("Found {} individuals matching criteria", results.total);
    println!("Showing page {} of {}", results.page.number, results.page_count());
    for person in &results.individuals {
        println!(
            "  #{:<6} {:<24} {:<2} {:>4}  {}, {}",
            person.individual_id,
            person.full_name,
            person.sex.as_deref().unwrap_or_default(),
            person.age.map(|a| a.to_string()).unwrap_or_default(),
            person.district_name,
            person.region_name
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let service = open(&cli)?;

    match &cli.command {
        Commands::Geo(command) => geo(&service, command)?,
        Commands::Household(command) => household(&service, command)?,
        Commands::Individual(command) => individual(&service, command)?,
        Commands::Housing(command) => housing(&service, command)?,
        Commands::Analytics(command) => analytics(&service, command)?,
        Commands::Search(command) => search(&service, command)?,
        Commands::Stats => {
            let stats = service.database_statistics()?;
            println!("Geographic areas:  {}", stats.geographic_areas);
            println!("Households:        {}", stats.households);
            println!("Individuals:       {}", stats.individuals);
            println!("Housing units:     {}", stats.housing_units);
            println!("Economic records:  {}", stats.economic_records);
            println!("Activity entries:  {}", stats.activity_log_entries);
        }
        Commands::Activity { table, operation, by_user, days } => {
            let mut filter = ActivityLogFilter::default().days_back(*days);
            if let Some(table) = table {
                let table = Table::from_name(table)
                    .ok_or_else(|| anyhow::anyhow!("Unknown table: {}", table))?;
                filter = filter.table(table.name());
            }
            if let Some(operation) = operation {
                filter = filter.operation(operation.parse::<OperationKind>()?);
            }
            if let Some(user) = by_user {
                filter = filter.user(user.as_str());
            }

            let entries = service.activity_log(&filter)?;
            if entries.is_empty() {
                println!("No activity in the last {} days", days);
            }
            for entry in entries {
                println!(
                    "{} {:<6} {:<18} #{:<6} by {} ({})",
                    entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.operation,
                    entry.table_name,
                    entry.record_id,
                    entry.user_name,
                    entry.application_name
                );
                if let Some(old) = &entry.old_values {
                    println!("    before: {}", old);
                }
                if let Some(new) = &entry.new_values {
                    println!("    after:  {}", new);
                }
            }
        }
        Commands::Sample => {
            let summary = load_sample_data(&service)?;
            println!(
                "Loaded {} areas, {} households, {} individuals",
                summary.geographic_areas, summary.households, summary.individuals
            );
        }
    }

    Ok(())
}
