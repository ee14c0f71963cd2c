use anyhow::Result;
use census_db::audit::ActivityLogFilter;
use census_db::census::{GeographicalInfo, Household, Individual, Sex};
use census_db::db::{Filter, OperationKind, Statement, Table};
use census_db::{row, CensusError, CensusService, Db};
use serde::Deserialize;

#[derive(Deserialize, Debug, PartialEq)]
struct Counts {
    total_members: i64,
    total_males: i64,
    total_females: i64,
}

#[derive(Deserialize)]
struct HouseholdId {
    household_id: i64,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Truth {
    members: i64,
    males: i64,
    females: i64,
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn service() -> Result<CensusService> {
    init_logging();
    Ok(CensusService::new(Db::open_memory()?))
}

fn new_household(service: &CensusService) -> Result<i64> {
    let geo_id = service.create(&GeographicalInfo {
        region_name: "Ashanti".to_string(),
        district_name: "Kumasi Metropolitan".to_string(),
        ..Default::default()
    })?;
    Ok(service.create(&Household::new(geo_id))?)
}

fn counts(db: &Db, household_id: i64) -> Result<Counts> {
    let mut rows: Vec<Counts> = db.query(
        "SELECT total_members, total_males, total_females FROM HOUSEHOLD WHERE household_id = ?",
        [household_id],
    )?;
    rows.pop().ok_or_else(|| anyhow::anyhow!("household {} missing", household_id))
}

/// Asserts the stored aggregates of every household match a live count.
fn assert_consistent(db: &Db) -> Result<()> {
    let households: Vec<HouseholdId> = db.query("SELECT household_id FROM HOUSEHOLD", [])?;
    for household in households {
        let id = household.household_id;
        let truth: Vec<Truth> = db.query(
            "SELECT COUNT(*) AS members,
                    COALESCE(SUM(sex = 'M'), 0) AS males,
                    COALESCE(SUM(sex = 'F'), 0) AS females
             FROM INDIVIDUAL WHERE household_id = ?",
            [id],
        )?;
        let stored = counts(db, id)?;
        assert_eq!(
            (stored.total_members, stored.total_males, stored.total_females),
            (truth[0].members, truth[0].males, truth[0].females),
            "household {} drifted",
            id
        );
    }
    Ok(())
}

fn household_updates(service: &CensusService) -> Result<usize> {
    Ok(service
        .activity_log(&ActivityLogFilter::default().table("HOUSEHOLD").operation(OperationKind::Update))?
        .len())
}

#[test]
fn ama_and_kojo() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;

    let ama = service.create(&Individual::new(h, "Ama", Sex::Female, 31))?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 1, total_males: 0, total_females: 1 });

    let kojo = service.create(&Individual::new(h, "Kojo", Sex::Male, 35))?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 2, total_males: 1, total_females: 1 });

    service.delete::<Individual>(ama)?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 1, total_males: 1, total_females: 0 });
    assert_consistent(service.db())?;

    let entries = service.activity_log(&ActivityLogFilter::default().table("INDIVIDUAL"))?;
    let logged: Vec<_> = entries.iter().map(|e| (e.operation, e.record_id)).collect();
    assert_eq!(
        logged,
        vec![
            (OperationKind::Delete, ama),
            (OperationKind::Insert, kojo),
            (OperationKind::Insert, ama),
        ]
    );
    Ok(())
}

#[test]
fn moving_an_individual_recounts_source_and_destination() -> Result<()> {
    let service = service()?;
    let a = new_household(&service)?;
    let b = new_household(&service)?;
    let ama = service.create(&Individual::new(a, "Ama", Sex::Female, 31))?;
    service.create(&Individual::new(a, "Kojo", Sex::Male, 35))?;

    let before = household_updates(&service)?;
    service.move_individual(ama, b)?;
    assert_eq!(household_updates(&service)? - before, 2);

    assert_eq!(counts(service.db(), a)?, Counts { total_members: 1, total_males: 1, total_females: 0 });
    assert_eq!(counts(service.db(), b)?, Counts { total_members: 1, total_males: 0, total_females: 1 });
    assert_consistent(service.db())
}

#[test]
fn moving_to_a_missing_household_is_not_found() -> Result<()> {
    let service = service()?;
    let a = new_household(&service)?;
    let ama = service.create(&Individual::new(a, "Ama", Sex::Female, 31))?;

    let result = service.move_individual(ama, 9999);
    assert!(matches!(result, Err(CensusError::NotFound { table: Table::Household, id: 9999 })));
    assert_eq!(counts(service.db(), a)?.total_members, 1);
    Ok(())
}

#[test]
fn bulk_statement_recounts_each_household_exactly_once() -> Result<()> {
    let service = service()?;
    let households = [
        new_household(&service)?,
        new_household(&service)?,
        new_household(&service)?,
    ];

    let before = household_updates(&service)?;
    let people: Vec<_> = (0..9_i64)
        .map(|i| {
            row! {
                "household_id" => households[(i % 3) as usize],
                "full_name" => format!("Person {}", i),
                "sex" => if i % 2 == 0 { "M" } else { "F" },
                "age" => 20 + i,
            }
        })
        .collect();
    service.db().execute(Statement::insert_many(Table::Individual, people))?;
    assert_eq!(household_updates(&service)? - before, 3);

    // Shift everyone in the first household to the second in one statement.
    let before = household_updates(&service)?;
    service.db().execute(Statement::update(
        Table::Individual,
        Filter::eq("household_id", households[0]),
        row! { "household_id" => households[1] },
    ))?;
    assert_eq!(household_updates(&service)? - before, 2);
    assert_eq!(counts(service.db(), households[0])?.total_members, 0);
    assert_eq!(counts(service.db(), households[1])?.total_members, 6);

    service.db().execute(Statement::delete(Table::Individual, Filter::All))?;
    assert_consistent(service.db())?;
    assert_eq!(counts(service.db(), households[1])?.total_members, 0);
    Ok(())
}

#[test]
fn changing_sex_updates_sub_counts() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;
    let id = service.create(&Individual::new(h, "Esi", Sex::Female, 22))?;

    service.update_columns::<Individual>(id, row! { "sex" => "M" })?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 1, total_males: 1, total_females: 0 });
    Ok(())
}

#[test]
fn aggregates_cannot_be_written_by_clients() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;
    service.create(&Individual::new(h, "Ama", Sex::Female, 31))?;

    let mut household: Household = service.get(h)?;
    household.total_members = 40;
    household.type_of_residence = Some("Urban".to_string());
    service.update(h, &household)?;

    let stored: Household = service.get(h)?;
    assert_eq!(stored.total_members, 1);
    assert_eq!(stored.type_of_residence.as_deref(), Some("Urban"));

    let result = service.update_columns::<Household>(h, row! { "total_members" => 40_i64 });
    assert!(matches!(result, Err(CensusError::InvalidInput(_))));
    Ok(())
}

#[test]
fn aggregates_cannot_be_written_through_the_write_path() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;
    let geo = service.get::<Household>(h)?.geo_id;
    let log_before = service.activity_log(&ActivityLogFilter::default())?.len();

    let update = service.db().execute(Statement::update(
        Table::Household,
        Filter::Id(h),
        row! { "total_members" => 40_i64, "total_males" => 40_i64 },
    ));
    assert!(matches!(update.map_err(CensusError::from), Err(CensusError::InvalidInput(_))));

    let insert = service.db().execute(Statement::insert(
        Table::Household,
        row! { "geo_id" => geo, "total_members" => 7_i64 },
    ));
    assert!(matches!(insert.map_err(CensusError::from), Err(CensusError::InvalidInput(_))));

    assert_eq!(counts(service.db(), h)?, Counts { total_members: 0, total_males: 0, total_females: 0 });
    assert_eq!(service.list::<Household>(&Filter::All)?.len(), 1);
    assert_eq!(service.activity_log(&ActivityLogFilter::default())?.len(), log_before);
    assert_consistent(service.db())
}

#[test]
fn unknown_sex_counts_as_member_only() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;

    let ids = service.db().execute(Statement::insert_many(
        Table::Individual,
        vec![
            row! { "household_id" => h, "full_name" => "Unrecorded", "age" => 40_i64 },
            row! { "household_id" => h, "full_name" => "Akua", "sex" => "F", "age" => 12_i64 },
        ],
    ))?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 2, total_males: 0, total_females: 1 });

    service.db().execute(Statement::update(
        Table::Individual,
        Filter::Id(ids[1]),
        row! { "sex" => rusqlite::types::Value::Null },
    ))?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 2, total_males: 0, total_females: 0 });

    service.update_columns::<Individual>(ids[0], row! { "sex" => "M" })?;
    assert_eq!(counts(service.db(), h)?, Counts { total_members: 2, total_males: 1, total_females: 0 });
    assert_consistent(service.db())
}

#[test]
fn failed_recount_rolls_back_the_statement() -> Result<()> {
    let service = service()?;
    let h = new_household(&service)?;
    service.create(&Individual::new(h, "Ama", Sex::Female, 31))?;
    service.create(&Individual::new(h, "Kojo", Sex::Male, 35))?;

    service.db().transaction(|txn| {
        txn.connection().execute_batch(
            "CREATE TRIGGER household_full BEFORE UPDATE OF total_members ON HOUSEHOLD
             WHEN NEW.total_members > 2
             BEGIN SELECT RAISE(ABORT, 'household full'); END;",
        )?;
        Ok(())
    })?;

    let log_before = service.activity_log(&ActivityLogFilter::default())?.len();
    let result = service.create(&Individual::new(h, "Yaw", Sex::Male, 3));
    assert!(matches!(result, Err(CensusError::ConstraintViolation(_))), "{:?}", result);

    let members: Vec<Individual> = service.list(&Filter::eq("household_id", h))?;
    assert_eq!(members.len(), 2);
    assert_eq!(counts(service.db(), h)?.total_members, 2);
    assert_eq!(service.activity_log(&ActivityLogFilter::default())?.len(), log_before);
    Ok(())
}
