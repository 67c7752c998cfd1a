//! Deterministic demo dataset used by the `seed` CLI command and the
//! integration tests. Ids are autoincrement so the loader returns the
//! handles it created instead of hardcoding them.

use claimflow_core::{CompanyId, Role, UserId};

use crate::connection::DbPool;
use crate::repositories::{sequence, user, RepositoryError};

/// One company with an admin, two managers, and two employees reporting to
/// the first manager, plus the default approval sequence.
#[derive(Clone, Copy, Debug)]
pub struct SeededCompany {
    pub company_id: CompanyId,
    pub admin: UserId,
    pub manager_one: UserId,
    pub manager_two: UserId,
    pub employee_one: UserId,
    pub employee_two: UserId,
    pub sequence_slots: u32,
}

pub struct DemoDataset;

impl DemoDataset {
    pub async fn load(pool: &DbPool) -> Result<SeededCompany, RepositoryError> {
        let mut tx = pool.begin().await?;

        let company_id =
            crate::repositories::company::insert(&mut *tx, "Demo Corp", Some("US"), "USD").await?;

        let admin = user::insert(
            &mut *tx,
            company_id,
            "Ada Admin",
            "ada.admin@demo.example",
            Role::Admin,
            None,
        )
        .await?;
        let manager_one = user::insert(
            &mut *tx,
            company_id,
            "Max Manager",
            "max.manager@demo.example",
            Role::Manager,
            Some(admin),
        )
        .await?;
        let manager_two = user::insert(
            &mut *tx,
            company_id,
            "Mia Manager",
            "mia.manager@demo.example",
            Role::Manager,
            Some(admin),
        )
        .await?;
        let employee_one = user::insert(
            &mut *tx,
            company_id,
            "Evan Employee",
            "evan.employee@demo.example",
            Role::Employee,
            Some(manager_one),
        )
        .await?;
        let employee_two = user::insert(
            &mut *tx,
            company_id,
            "Elif Employee",
            "elif.employee@demo.example",
            Role::Employee,
            Some(manager_one),
        )
        .await?;

        let sequence_slots = sequence::ensure_default_sequence(&mut tx, company_id).await?;

        tx.commit().await?;

        Ok(SeededCompany {
            company_id,
            admin,
            manager_one,
            manager_two,
            employee_one,
            employee_two,
            sequence_slots,
        })
    }
}
