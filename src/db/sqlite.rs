//! Typed stores over the shared handle.
//!
//! Stores are cheap and short-lived: build one from the handle returned by
//! `DbManager::connection()` for the request at hand and drop it afterwards.

use crate::db::conn::{Db, DbTx};
use crate::db::models::{
    AuthRecord, Domain, DomainStatus, FriendlyLink, NewDomain, NewFriendlyLink, NewSoldDomain,
    SaleDetails, SiteSettings, SoldDomain,
};
use crate::db::schema::Table;
use crate::db::seed::{self, ADMIN_ID, DEFAULT_PASSWORD};
use crate::error::AdminError;
use crate::params;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;
use tracing::info;
use uuid::Uuid;

const TOUCH: &str = "updated_at = strftime('%s', 'now')";

fn new_id(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn require(field: &str, value: &str) -> Result<(), AdminError> {
    if value.trim().is_empty() {
        return Err(AdminError::Validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

/// Sold listings live in `sold_domains`; only `mark_sold` moves one there.
fn listable(status: DomainStatus) -> Result<(), AdminError> {
    if status == DomainStatus::Sold {
        return Err(AdminError::Validation(
            "use mark-as-sold to record a sale".to_string(),
        ));
    }
    Ok(())
}

fn expect_one(rows_affected: u64, what: &str, id: &str) -> Result<(), AdminError> {
    if rows_affected == 0 {
        return Err(AdminError::NotFound(format!("{what} {id}")));
    }
    Ok(())
}

#[derive(Clone)]
pub struct DomainStore {
    db: Db,
}

impl DomainStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Domain>, AdminError> {
        let rows = self
            .db
            .get_many("SELECT * FROM domains ORDER BY created_at DESC, id", &[])
            .await?;
        Ok(rows
            .into_iter()
            .map(row_to_domain)
            .collect::<Result<_, _>>()?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Domain>, AdminError> {
        let row = self
            .db
            .get_one("SELECT * FROM domains WHERE id = ?", &params![id])
            .await?;
        Ok(row.map(row_to_domain).transpose()?)
    }

    pub async fn create(&self, new: NewDomain) -> Result<Domain, AdminError> {
        require("name", &new.name)?;
        require("extension", &new.extension)?;
        listable(new.status)?;
        let id = new_id(new.id);
        self.db
            .execute(
                "INSERT INTO domains (id, name, extension, status, registrar, registrar_icon, \
                 registration_time, expiration_time, purchase_url, price, description) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &params![
                    id.as_str(),
                    new.name,
                    new.extension,
                    new.status.as_str(),
                    new.registrar,
                    new.registrar_icon,
                    new.registration_time,
                    new.expiration_time,
                    new.purchase_url,
                    new.price,
                    new.description,
                ],
            )
            .await?;
        info!(id = %id, "domain created");
        self.get(&id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("domain {id}")))
    }

    pub async fn update(&self, id: &str, change: NewDomain) -> Result<Domain, AdminError> {
        require("name", &change.name)?;
        require("extension", &change.extension)?;
        listable(change.status)?;
        let summary = self
            .db
            .execute(
                &format!(
                    "UPDATE domains SET name = ?, extension = ?, status = ?, registrar = ?, \
                     registrar_icon = ?, registration_time = ?, expiration_time = ?, \
                     purchase_url = ?, price = ?, description = ?, {TOUCH} WHERE id = ?"
                ),
                &params![
                    change.name,
                    change.extension,
                    change.status.as_str(),
                    change.registrar,
                    change.registrar_icon,
                    change.registration_time,
                    change.expiration_time,
                    change.purchase_url,
                    change.price,
                    change.description,
                    id,
                ],
            )
            .await?;
        expect_one(summary.rows_affected, "domain", id)?;
        self.get(id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("domain {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AdminError> {
        let summary = self
            .db
            .execute("DELETE FROM domains WHERE id = ?", &params![id])
            .await?;
        expect_one(summary.rows_affected, "domain", id)
    }

    /// Move a listing into the sold collection.
    ///
    /// The sold record is inserted and the listing deleted in one
    /// transaction, so the name never shows up in both collections.
    pub async fn mark_sold(&self, id: &str, sale: SaleDetails) -> Result<SoldDomain, AdminError> {
        let mut tx = self.db.begin().await?;
        let domain = tx
            .get_one("SELECT * FROM domains WHERE id = ?", &params![id])
            .await?
            .map(row_to_domain)
            .transpose()?
            .ok_or_else(|| AdminError::NotFound(format!("domain {id}")))?;

        let sold_id = Uuid::new_v4().to_string();
        let sold_date = sale
            .sold_date
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
        tx.execute(
            "INSERT INTO sold_domains (id, name, extension, status, sold_to, sold_date, \
             sold_price, description) VALUES (?, ?, ?, 'sold', ?, ?, ?, ?)",
            &params![
                sold_id.as_str(),
                domain.name.as_str(),
                domain.extension.as_str(),
                sale.sold_to,
                sold_date,
                sale.sold_price.or(domain.price),
                domain.description,
            ],
        )
        .await?;
        tx.execute("DELETE FROM domains WHERE id = ?", &params![id])
            .await?;
        let sold = fetch_sold(&mut tx, &sold_id).await?;
        tx.commit().await?;
        info!(domain = %id, sold = %sold_id, name = %domain.name, "domain marked as sold");
        Ok(sold)
    }
}

async fn fetch_sold(tx: &mut DbTx, id: &str) -> Result<SoldDomain, AdminError> {
    tx.get_one("SELECT * FROM sold_domains WHERE id = ?", &params![id])
        .await?
        .map(row_to_sold)
        .transpose()?
        .ok_or_else(|| AdminError::NotFound(format!("sold domain {id}")))
}

#[derive(Clone)]
pub struct SoldDomainStore {
    db: Db,
}

impl SoldDomainStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<SoldDomain>, AdminError> {
        let rows = self
            .db
            .get_many(
                "SELECT * FROM sold_domains ORDER BY sold_date DESC, id",
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(row_to_sold).collect::<Result<_, _>>()?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<SoldDomain>, AdminError> {
        let row = self
            .db
            .get_one("SELECT * FROM sold_domains WHERE id = ?", &params![id])
            .await?;
        Ok(row.map(row_to_sold).transpose()?)
    }

    pub async fn create(&self, new: NewSoldDomain) -> Result<SoldDomain, AdminError> {
        require("name", &new.name)?;
        require("extension", &new.extension)?;
        let id = new_id(new.id);
        self.db
            .execute(
                "INSERT INTO sold_domains (id, name, extension, status, sold_to, sold_date, \
                 sold_price, description) VALUES (?, ?, ?, 'sold', ?, ?, ?, ?)",
                &params![
                    id.as_str(),
                    new.name,
                    new.extension,
                    new.sold_to,
                    new.sold_date,
                    new.sold_price,
                    new.description,
                ],
            )
            .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("sold domain {id}")))
    }

    pub async fn update(&self, id: &str, change: NewSoldDomain) -> Result<SoldDomain, AdminError> {
        require("name", &change.name)?;
        require("extension", &change.extension)?;
        let summary = self
            .db
            .execute(
                &format!(
                    "UPDATE sold_domains SET name = ?, extension = ?, sold_to = ?, \
                     sold_date = ?, sold_price = ?, description = ?, {TOUCH} WHERE id = ?"
                ),
                &params![
                    change.name,
                    change.extension,
                    change.sold_to,
                    change.sold_date,
                    change.sold_price,
                    change.description,
                    id,
                ],
            )
            .await?;
        expect_one(summary.rows_affected, "sold domain", id)?;
        self.get(id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("sold domain {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AdminError> {
        let summary = self
            .db
            .execute("DELETE FROM sold_domains WHERE id = ?", &params![id])
            .await?;
        expect_one(summary.rows_affected, "sold domain", id)
    }
}

#[derive(Clone)]
pub struct LinkStore {
    db: Db,
}

impl LinkStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<FriendlyLink>, AdminError> {
        let rows = self
            .db
            .get_many("SELECT * FROM friendly_links ORDER BY created_at, id", &[])
            .await?;
        Ok(rows.into_iter().map(row_to_link).collect::<Result<_, _>>()?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<FriendlyLink>, AdminError> {
        let row = self
            .db
            .get_one("SELECT * FROM friendly_links WHERE id = ?", &params![id])
            .await?;
        Ok(row.map(row_to_link).transpose()?)
    }

    pub async fn create(&self, new: NewFriendlyLink) -> Result<FriendlyLink, AdminError> {
        require("name", &new.name)?;
        require("url", &new.url)?;
        let id = new_id(new.id);
        self.db
            .execute(
                "INSERT INTO friendly_links (id, name, url, description) VALUES (?, ?, ?, ?)",
                &params![id.as_str(), new.name, new.url, new.description],
            )
            .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("friendly link {id}")))
    }

    pub async fn update(&self, id: &str, change: NewFriendlyLink) -> Result<FriendlyLink, AdminError> {
        require("name", &change.name)?;
        require("url", &change.url)?;
        let summary = self
            .db
            .execute(
                "UPDATE friendly_links SET name = ?, url = ?, description = ? WHERE id = ?",
                &params![change.name, change.url, change.description, id],
            )
            .await?;
        expect_one(summary.rows_affected, "friendly link", id)?;
        self.get(id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("friendly link {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AdminError> {
        let summary = self
            .db
            .execute("DELETE FROM friendly_links WHERE id = ?", &params![id])
            .await?;
        expect_one(summary.rows_affected, "friendly link", id)
    }
}

/// Key/value settings plus the registrar icon table.
#[derive(Clone)]
pub struct SettingsStore {
    db: Db,
}

impl SettingsStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get(&self) -> Result<SiteSettings, AdminError> {
        let rows = self
            .db
            .get_many("SELECT key, value FROM site_settings ORDER BY key", &[])
            .await?;
        let mut values = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let value: Option<String> = row.try_get("value")?;
            values.insert(key, value.unwrap_or_default());
        }
        Ok(SiteSettings {
            values,
            registrar_icons: self.icons().await?,
        })
    }

    pub async fn icons(&self) -> Result<BTreeMap<String, String>, AdminError> {
        let rows = self
            .db
            .get_many("SELECT name, svg FROM registrar_icons ORDER BY name", &[])
            .await?;
        rows.into_iter()
            .map(|row| -> Result<(String, String), AdminError> {
                Ok((row.try_get("name")?, row.try_get("svg")?))
            })
            .collect()
    }

    /// Upsert the given keys and, when `icons` is given, replace the whole
    /// icon collection. Runs as one transaction.
    pub async fn update(
        &self,
        values: &BTreeMap<String, String>,
        icons: Option<&BTreeMap<String, String>>,
    ) -> Result<SiteSettings, AdminError> {
        let mut tx = self.db.begin().await?;
        for (key, value) in values {
            upsert_setting(&mut tx, key, value).await?;
        }
        if let Some(icons) = icons {
            replace_icons(&mut tx, icons).await?;
        }
        tx.commit().await?;
        info!(keys = values.len(), icons = icons.map(BTreeMap::len), "site settings updated");
        self.get().await
    }

    pub async fn set_key(&self, key: &str, value: &str) -> Result<(), AdminError> {
        require("key", key)?;
        let mut tx = self.db.begin().await?;
        upsert_setting(&mut tx, key, value).await?;
        tx.commit().await
    }

    pub async fn replace_icons(&self, icons: &BTreeMap<String, String>) -> Result<(), AdminError> {
        let mut tx = self.db.begin().await?;
        replace_icons(&mut tx, icons).await?;
        tx.commit().await
    }

    /// Put settings and registrar icons back to the baseline.
    pub async fn reset(&self) -> Result<SiteSettings, AdminError> {
        let mut tx = self.db.begin().await?;
        for table in [Table::SiteSettings, Table::RegistrarIcons] {
            seed::replace_with_baseline(&mut tx, table).await?;
        }
        tx.commit().await?;
        info!("site settings reset to defaults");
        self.get().await
    }
}

async fn upsert_setting(tx: &mut DbTx, key: &str, value: &str) -> Result<(), AdminError> {
    tx.execute(
        "INSERT INTO site_settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        &params![key, value],
    )
    .await?;
    Ok(())
}

async fn replace_icons(tx: &mut DbTx, icons: &BTreeMap<String, String>) -> Result<(), AdminError> {
    tx.execute("DELETE FROM registrar_icons", &[]).await?;
    for (name, svg) in icons {
        require("registrar icon name", name)?;
        require("registrar icon svg", svg)?;
        tx.execute(
            "INSERT INTO registrar_icons (id, name, svg) VALUES (?, ?, ?)",
            &params![Uuid::new_v4().to_string(), name, svg],
        )
        .await?;
    }
    Ok(())
}

/// The singleton admin credential row. Passwords are stored as given.
#[derive(Clone)]
pub struct AuthStore {
    db: Db,
}

impl AuthStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// The admin row, created with defaults if it is missing.
    pub async fn get_or_create(&self) -> Result<AuthRecord, AdminError> {
        if let Some(row) = self
            .db
            .get_one("SELECT * FROM auth WHERE id = ?", &params![ADMIN_ID])
            .await?
        {
            return Ok(row_to_auth(row)?);
        }
        self.db
            .execute(
                "INSERT OR IGNORE INTO auth (id, password, security_code, is_logged_in) \
                 VALUES (?, ?, '', 0)",
                &params![ADMIN_ID, DEFAULT_PASSWORD],
            )
            .await?;
        info!("admin auth record created with default password");
        let row = self
            .db
            .get_one("SELECT * FROM auth WHERE id = ?", &params![ADMIN_ID])
            .await?
            .ok_or_else(|| AdminError::NotFound("auth record".to_string()))?;
        Ok(row_to_auth(row)?)
    }

    pub async fn verify_password(&self, candidate: &str) -> Result<bool, AdminError> {
        let record = self.get_or_create().await?;
        Ok(bool::from(
            candidate.as_bytes().ct_eq(record.password.as_bytes()),
        ))
    }

    /// Check the password and flag the session as logged in on success.
    pub async fn login(&self, password: &str) -> Result<bool, AdminError> {
        if !self.verify_password(password).await? {
            return Ok(false);
        }
        self.set_logged_in(true).await?;
        Ok(true)
    }

    pub async fn set_logged_in(&self, logged_in: bool) -> Result<(), AdminError> {
        self.get_or_create().await?;
        self.db
            .execute(
                &format!("UPDATE auth SET is_logged_in = ?, {TOUCH} WHERE id = ?"),
                &params![logged_in, ADMIN_ID],
            )
            .await?;
        Ok(())
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), AdminError> {
        require("newPassword", new)?;
        if !self.verify_password(current).await? {
            return Err(AdminError::Validation(
                "current password is incorrect".to_string(),
            ));
        }
        self.write_password(new).await?;
        info!("admin password changed");
        Ok(())
    }

    pub async fn security_code(&self) -> Result<String, AdminError> {
        Ok(self.get_or_create().await?.security_code)
    }

    pub async fn set_security_code(&self, code: &str) -> Result<(), AdminError> {
        self.get_or_create().await?;
        self.db
            .execute(
                &format!("UPDATE auth SET security_code = ?, {TOUCH} WHERE id = ?"),
                &params![code, ADMIN_ID],
            )
            .await?;
        Ok(())
    }

    /// Put the password back to the default when `code` matches the stored
    /// security code. An unset code never matches.
    pub async fn reset_by_code(&self, code: &str) -> Result<(), AdminError> {
        let record = self.get_or_create().await?;
        if record.security_code.is_empty() {
            return Err(AdminError::Validation(
                "no security code has been configured".to_string(),
            ));
        }
        if !bool::from(code.as_bytes().ct_eq(record.security_code.as_bytes())) {
            return Err(AdminError::Validation("security code is incorrect".to_string()));
        }
        self.write_password(DEFAULT_PASSWORD).await?;
        info!("admin password reset via security code");
        Ok(())
    }

    async fn write_password(&self, password: &str) -> Result<(), AdminError> {
        self.db
            .execute(
                &format!("UPDATE auth SET password = ?, {TOUCH} WHERE id = ?"),
                &params![password, ADMIN_ID],
            )
            .await?;
        Ok(())
    }
}

fn row_to_domain(row: SqliteRow) -> Result<Domain, sqlx::Error> {
    let status: Option<String> = row.try_get("status")?;
    let status = match status {
        Some(s) => s
            .parse::<DomainStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        None => DomainStatus::Available,
    };
    Ok(Domain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        extension: row.try_get("extension")?,
        status,
        registrar: row.try_get("registrar")?,
        registrar_icon: row.try_get("registrar_icon")?,
        registration_time: row.try_get("registration_time")?,
        expiration_time: row.try_get("expiration_time")?,
        purchase_url: row.try_get("purchase_url")?,
        price: row.try_get("price")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_sold(row: SqliteRow) -> Result<SoldDomain, sqlx::Error> {
    Ok(SoldDomain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        extension: row.try_get("extension")?,
        status: DomainStatus::Sold,
        sold_to: row.try_get("sold_to")?,
        sold_date: row.try_get("sold_date")?,
        sold_price: row.try_get("sold_price")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_link(row: SqliteRow) -> Result<FriendlyLink, sqlx::Error> {
    Ok(FriendlyLink {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_auth(row: SqliteRow) -> Result<AuthRecord, sqlx::Error> {
    let logged_in: Option<i64> = row.try_get("is_logged_in")?;
    Ok(AuthRecord {
        id: row.try_get("id")?,
        password: row
            .try_get::<Option<String>, _>("password")?
            .unwrap_or_default(),
        security_code: row
            .try_get::<Option<String>, _>("security_code")?
            .unwrap_or_default(),
        is_logged_in: logged_in.unwrap_or(0) != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
