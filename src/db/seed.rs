//! Baseline rows for a fresh or freshly reset data file.
//!
//! Each table is seeded on its own: a table is filled only while it is empty,
//! and one table's failure never blocks another.

use crate::db::conn::{Db, DbTx, SqlValue};
use crate::db::schema::{DEFAULT_FAVICON, DEFAULT_LOGO_TYPE, DEFAULT_SITE_NAME, Table};
use crate::error::AdminError;
use crate::params;
use tracing::{debug, info, warn};

pub const DEFAULT_PASSWORD: &str = "admin123";
pub const ADMIN_ID: &str = "admin";

pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("siteName", DEFAULT_SITE_NAME),
    ("logoType", DEFAULT_LOGO_TYPE),
    ("logoText", DEFAULT_SITE_NAME),
    ("favicon", DEFAULT_FAVICON),
];

pub const DEFAULT_REGISTRAR_ICONS: &[(&str, &str)] = &[
    (
        "aliyun",
        r#"<svg viewBox="0 0 24 24"><path d="M12 2L2 7v10l10 5 10-5V7L12 2z"/></svg>"#,
    ),
    (
        "tencent",
        r#"<svg viewBox="0 0 24 24"><circle cx="12" cy="12" r="10"/></svg>"#,
    ),
    (
        "godaddy",
        r#"<svg viewBox="0 0 24 24"><rect width="20" height="20" x="2" y="2"/></svg>"#,
    ),
    (
        "namecheap",
        r#"<svg viewBox="0 0 24 24"><path d="M12 2 L2 7 L12 12 L22 7 Z" /><path d="M2 17 L12 22 L22 17" /><path d="M2 12 L12 17 L22 12" /></svg>"#,
    ),
    (
        "huawei",
        r#"<svg viewBox="0 0 24 24"><rect x="2" y="2" width="20" height="8" rx="2" ry="2" /><rect x="2" y="14" width="20" height="8" rx="2" ry="2" /></svg>"#,
    ),
];

// id, name, extension, registrar, registrar_icon, registered, expires, purchase url
type DomainSeed = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
);

const DEFAULT_DOMAINS: &[DomainSeed] = &[
    (
        "1",
        "example",
        ".com",
        "阿里云",
        "aliyun",
        "2023-05-15",
        "2025-05-15",
        "https://wanwang.aliyun.com/domain/searchresult?keyword=example.com",
    ),
    (
        "2",
        "mywebsite",
        ".org",
        "腾讯云",
        "tencent",
        "2022-11-20",
        "2024-11-20",
        "https://dnspod.cloud.tencent.com/domain/buy?domain=mywebsite.org",
    ),
    (
        "3",
        "coolproject",
        ".io",
        "GoDaddy",
        "godaddy",
        "2024-01-10",
        "2026-01-10",
        "https://www.godaddy.com/domainsearch/find?domainToCheck=coolproject.io",
    ),
    (
        "4",
        "portfolio",
        ".dev",
        "Namecheap",
        "namecheap",
        "2023-08-05",
        "2025-08-05",
        "https://www.namecheap.com/domains/registration/results/?domain=portfolio.dev",
    ),
    (
        "5",
        "business",
        ".co",
        "华为云",
        "huawei",
        "2024-03-22",
        "2026-03-22",
        "https://www.huaweicloud.com/product/domain.html",
    ),
];

// id, name, extension, sold to, sold date
const DEFAULT_SOLD_DOMAINS: &[(&str, &str, &str, &str, &str)] = &[
    ("s1", "premium", ".com", "科技解决方案公司", "2025-02-15"),
    ("s2", "digital", ".io", "创意代理公司", "2025-01-20"),
    ("s3", "ecommerce", ".store", "在线零售有限公司", "2024-12-10"),
];

const DEFAULT_LINKS: &[(&str, &str, &str, &str)] = &[
    (
        "1",
        "域名注册服务",
        "https://example.com/register",
        "提供专业的域名注册和管理服务",
    ),
    (
        "2",
        "网站建设平台",
        "https://example.com/website-builder",
        "快速搭建专业网站的一站式平台",
    ),
    (
        "3",
        "域名行情分析",
        "https://example.com/domain-market",
        "最新域名市场趋势和价值分析",
    ),
    (
        "4",
        "云服务提供商",
        "https://example.com/cloud",
        "高性能云服务器和存储解决方案",
    ),
    (
        "5",
        "域名投资指南",
        "https://example.com/investment",
        "专业的域名投资策略和建议",
    ),
];

/// The insert statements that make up a table's baseline.
pub fn baseline(table: Table) -> Vec<(&'static str, Vec<SqlValue>)> {
    match table {
        Table::Domains => DEFAULT_DOMAINS
            .iter()
            .map(|&(id, name, ext, registrar, icon, registered, expires, url)| {
                (
                    "INSERT INTO domains (id, name, extension, status, registrar, registrar_icon, \
                     registration_time, expiration_time, purchase_url) \
                     VALUES (?, ?, ?, 'available', ?, ?, ?, ?, ?)",
                    params![id, name, ext, registrar, icon, registered, expires, url],
                )
            })
            .collect(),
        Table::SoldDomains => DEFAULT_SOLD_DOMAINS
            .iter()
            .map(|&(id, name, ext, sold_to, sold_date)| {
                (
                    "INSERT INTO sold_domains (id, name, extension, status, sold_to, sold_date) \
                     VALUES (?, ?, ?, 'sold', ?, ?)",
                    params![id, name, ext, sold_to, sold_date],
                )
            })
            .collect(),
        Table::FriendlyLinks => DEFAULT_LINKS
            .iter()
            .map(|&(id, name, url, description)| {
                (
                    "INSERT INTO friendly_links (id, name, url, description) VALUES (?, ?, ?, ?)",
                    params![id, name, url, description],
                )
            })
            .collect(),
        Table::SiteSettings => DEFAULT_SETTINGS
            .iter()
            .map(|&(key, value)| {
                (
                    "INSERT INTO site_settings (key, value) VALUES (?, ?)",
                    params![key, value],
                )
            })
            .collect(),
        Table::RegistrarIcons => DEFAULT_REGISTRAR_ICONS
            .iter()
            .enumerate()
            .map(|(i, &(name, svg))| {
                (
                    "INSERT INTO registrar_icons (id, name, svg) VALUES (?, ?, ?)",
                    params![(i + 1).to_string(), name, svg],
                )
            })
            .collect(),
        Table::Auth => vec![(
            "INSERT INTO auth (id, password, security_code, is_logged_in) VALUES (?, ?, '', 0)",
            params![ADMIN_ID, DEFAULT_PASSWORD],
        )],
    }
}

/// Insert the table's baseline if it has no rows. Returns whether it seeded.
pub async fn seed_if_empty(db: &Db, table: Table) -> Result<bool, AdminError> {
    if db.count(table.name()).await? > 0 {
        debug!(table = table.name(), "table not empty; seed skipped");
        return Ok(false);
    }

    let rows = baseline(table);
    let count = rows.len();
    let mut tx = db.begin().await?;
    for (sql, params) in rows {
        tx.execute(sql, &params).await?;
    }
    tx.commit().await?;
    info!(table = table.name(), rows = count, "baseline data seeded");
    Ok(true)
}

/// Seed every empty table. All tables are attempted even when one fails; the
/// first failure is returned once the pass is complete.
pub async fn seed_all(db: &Db) -> Result<Vec<Table>, AdminError> {
    let mut seeded = Vec::new();
    let mut first_err = None;
    for table in Table::ALL {
        match seed_if_empty(db, table).await {
            Ok(true) => seeded.push(table),
            Ok(false) => {}
            Err(e) => {
                warn!(table = table.name(), error = %e, "seeding failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(seeded),
    }
}

/// Clear every table and insert its baseline, all in one transaction.
///
/// Nothing else can write between the wipe and the inserts, so on success
/// every table holds exactly its baseline.
pub async fn restore_baseline(db: &Db) -> Result<Vec<Table>, AdminError> {
    let mut tx = db.begin().await?;
    for table in Table::ALL {
        replace_with_baseline(&mut tx, table).await?;
    }
    tx.commit().await?;
    info!(tables = Table::ALL.len(), "all tables restored to baseline");
    Ok(Table::ALL.to_vec())
}

pub async fn replace_with_baseline(tx: &mut DbTx, table: Table) -> Result<(), AdminError> {
    tx.execute(&format!("DELETE FROM {}", table.name()), &[])
        .await?;
    for (sql, params) in baseline(table) {
        tx.execute(sql, &params).await?;
    }
    Ok(())
}
