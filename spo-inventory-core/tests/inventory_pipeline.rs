use serde_json::json;
use spo_inventory_core::config::RunConfig;
use spo_inventory_core::contract::{
    MockConnector, MockLister, PlatformError, SiteConnection, SiteQuery, TenantConnection,
};
use spo_inventory_core::inventory::{run_inventory, InventoryError};
use spo_inventory_core::records::{ListItem, SiteRecord, NOBODY};
use spo_inventory_core::sink::{OutputSink, SinkPaths};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SITE_A: &str = "https://contoso.sharepoint.com/sites/alpha";
const SITE_B: &str = "https://contoso.sharepoint.com/sites/beta";

fn config_in(dir: &Path) -> RunConfig {
    RunConfig {
        tenant: "contoso".to_string(),
        log_dir: dir.join("logs"),
        ..RunConfig::default()
    }
}

fn sink_for(config: &RunConfig) -> OutputSink<Vec<u8>> {
    OutputSink::new(SinkPaths::from_config(config), Vec::new())
}

fn item(value: serde_json::Value) -> ListItem {
    ListItem::from_value(value).expect("object")
}

fn connected_connector() -> MockConnector {
    let mut connector = MockConnector::new();
    connector
        .expect_connect_admin()
        .times(1)
        .returning(|tenant, admin_url| {
            Ok(TenantConnection {
                tenant: tenant.to_string(),
                admin_url: admin_url.to_string(),
                access_token: "admin-token".to_string(),
            })
        });
    connector.expect_connect_site().returning(|_, site_url| {
        Ok(SiteConnection {
            site_url: site_url.to_string(),
            access_token: "site-token".to_string(),
        })
    });
    connector
}

fn error_lines(log: &str) -> usize {
    log.lines().filter(|l| l.contains("[ERROR]")).count()
}

#[tokio::test]
async fn missing_tenant_aborts_before_connecting() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        tenant: String::new(),
        ..config_in(dir.path())
    };
    let connector = MockConnector::new();
    let lister = MockLister::new();
    let mut sink = sink_for(&config);

    let result = run_inventory(&config, &connector, &lister, &mut sink).await;

    assert!(matches!(result, Err(InventoryError::MissingTenant)));
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert_eq!(error_lines(&log), 1);
    assert!(!config.files_path().exists());
    assert!(!config.sites_path().exists());
    assert!(!config.failures_path().exists());
}

#[tokio::test]
async fn placeholder_tenant_counts_as_missing() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        log_dir: dir.path().join("logs"),
        ..RunConfig::default()
    };
    let mut sink = sink_for(&config);

    let result = run_inventory(&config, &MockConnector::new(), &MockLister::new(), &mut sink).await;

    assert!(matches!(result, Err(InventoryError::MissingTenant)));
}

#[tokio::test]
async fn admin_connection_failure_stops_the_run() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let mut connector = MockConnector::new();
    connector
        .expect_connect_admin()
        .withf(|tenant, admin_url| {
            tenant == "contoso" && admin_url == "https://contoso-admin.sharepoint.com"
        })
        .times(1)
        .returning(|_, _| Err(PlatformError::Auth("bad secret".into())));
    connector.expect_connect_site().times(0);
    let mut lister = MockLister::new();
    lister.expect_list_sites().times(0);
    lister.expect_list_items().times(0);
    let mut sink = sink_for(&config);

    let result = run_inventory(&config, &connector, &lister, &mut sink).await;

    assert!(matches!(result, Err(InventoryError::Connect { .. })));
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert_eq!(error_lines(&log), 1);
    assert!(log.contains("bad secret"));
    assert!(!config.files_path().exists());
}

#[tokio::test]
async fn failing_site_does_not_block_the_next_one() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let connector = connected_connector();
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .times(1)
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false), SiteRecord::new(SITE_B, false)]));
    lister
        .expect_list_items()
        .withf(|site, _, _| site.site_url == SITE_A)
        .returning(|_, _, _| {
            Err(PlatformError::Http {
                status: 403,
                url: SITE_A.to_string(),
                body: "Access denied".to_string(),
            })
        });
    lister
        .expect_list_items()
        .withf(|site, library, page_size| {
            site.site_url == SITE_B && library == "Documents" && *page_size == 1000
        })
        .returning(|_, _, _| {
            Ok(vec![
                item(json!({"FileLeafRef": "budget.xlsx", "File_x0020_Size": 2048})),
                item(json!({"FileLeafRef": "Forms"})),
            ])
        });
    let mut sink = sink_for(&config);

    let report = run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .expect("run completes");

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].leaf_name, "budget.xlsx");
    assert_eq!(report.files[0].size_kb, 2.0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].action.contains(SITE_A));
    assert!(report.failures[0].reason.contains("Access denied"));

    let failures_csv = fs::read_to_string(config.failures_path()).unwrap();
    assert!(failures_csv.starts_with("Host,TimeStamp,Action,Reason"));
    assert_eq!(failures_csv.lines().count(), 2);
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert!(log.contains("[WARNING]"));
}

#[tokio::test]
async fn every_failing_site_is_recorded() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let mut connector = MockConnector::new();
    connector.expect_connect_admin().returning(|tenant, url| {
        Ok(TenantConnection {
            tenant: tenant.to_string(),
            admin_url: url.to_string(),
            access_token: "t".to_string(),
        })
    });
    connector
        .expect_connect_site()
        .times(2)
        .returning(|_, url| Err(PlatformError::Transport(format!("timeout {url}"))));
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false), SiteRecord::new(SITE_B, false)]));
    lister.expect_list_items().times(0);
    let mut sink = sink_for(&config);

    let report = run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    assert!(report.files.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures[0].action.contains(SITE_A));
    assert!(report.failures[1].action.contains(SITE_B));
}

#[tokio::test]
async fn site_enumeration_failure_is_recorded_and_run_finishes() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let connector = connected_connector();
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .returning(|_, _| Err(PlatformError::Decode("not json".into())));
    let mut sink = sink_for(&config);

    let report = run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].action.starts_with("List sites"));
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert!(log.contains("Inventory complete"));
    // An empty files export still gets created.
    assert!(config.files_path().exists());
}

#[tokio::test]
async fn personal_sites_are_listed_first_and_persisted() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        include_personal: true,
        ..config_in(dir.path())
    };
    let connector = connected_connector();
    let mut lister = MockLister::new();
    let mut seq = mockall::Sequence::new();
    lister
        .expect_list_sites()
        .withf(|_, query: &SiteQuery| query.personal && query.filter.contains("-my.sharepoint.com/personal/"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Ok(vec![SiteRecord::new(
                "https://contoso-my.sharepoint.com/personal/ann_contoso_com",
                true,
            )])
        });
    lister
        .expect_list_sites()
        .withf(|_, query: &SiteQuery| !query.personal && query.filter == "Url -like '/sites/'")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false)]));
    lister.expect_list_items().times(2).returning(|_, _, _| Ok(vec![]));
    let mut sink = sink_for(&config);

    let report = run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.sites.len(), 2);
    assert!(report.sites[0].personal);
    let sites_csv = fs::read_to_string(config.sites_path()).unwrap();
    assert_eq!(
        sites_csv,
        format!(
            "Url,Personal\nhttps://contoso-my.sharepoint.com/personal/ann_contoso_com,true\n{SITE_A},false\n"
        )
    );
    let console = String::from_utf8(sink.into_console()).unwrap();
    assert!(console.contains("ann_contoso_com"));
}

#[tokio::test]
async fn sites_export_is_skipped_without_personal_sites() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let connector = connected_connector();
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .times(1)
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false)]));
    lister.expect_list_items().returning(|_, _, _| Ok(vec![]));
    let mut sink = sink_for(&config);

    run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    assert!(!config.sites_path().exists());
    assert!(config.files_path().exists());
}

#[tokio::test]
async fn records_carry_nobody_for_missing_people() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        persist: false,
        ..config_in(dir.path())
    };
    let connector = connected_connector();
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false)]));
    lister.expect_list_items().returning(|_, _, _| {
        Ok(vec![
            item(json!({"FileLeafRef": "a.pdf"})),
            item(json!({
                "FileLeafRef": "b.pdf",
                "CheckoutUser": {"LookupValue": "Ann"},
                "SharedWithUsers": [{"LookupValue": "Bob"}],
            })),
        ])
    });
    let mut sink = sink_for(&config);

    let report = run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.files[0].checkout_user, NOBODY);
    assert_eq!(report.files[0].shared_with_users, NOBODY);
    assert_eq!(report.files[1].checkout_user, "Ann");
    assert_eq!(report.files[1].shared_with_users, "Bob");
    assert!(!config.files_path().exists());
}

#[tokio::test]
async fn console_disabled_prints_no_tables() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        console: false,
        ..config_in(dir.path())
    };
    let connector = connected_connector();
    let mut lister = MockLister::new();
    lister
        .expect_list_sites()
        .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false)]));
    lister
        .expect_list_items()
        .returning(|_, _, _| Ok(vec![item(json!({"FileLeafRef": "a.pdf"}))]));
    let mut sink = sink_for(&config);

    run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    let console = String::from_utf8(sink.into_console()).unwrap();
    assert!(!console.contains("FileLeafRef"));
    assert!(console.contains("Inventory complete"));
}

#[tokio::test]
async fn repeated_runs_append_with_one_header() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    for _ in 0..2 {
        let connector = connected_connector();
        let mut lister = MockLister::new();
        lister
            .expect_list_sites()
            .returning(|_, _| Ok(vec![SiteRecord::new(SITE_A, false)]));
        lister
            .expect_list_items()
            .returning(|_, _, _| Ok(vec![item(json!({"FileLeafRef": "a.pdf"}))]));
        let mut sink = sink_for(&config);
        run_inventory(&config, &connector, &lister, &mut sink)
            .await
            .unwrap();
    }

    let files_csv = fs::read_to_string(config.files_path()).unwrap();
    assert_eq!(files_csv.matches("UniqueId,Name,FileLeafRef").count(), 1);
    assert_eq!(files_csv.lines().count(), 3);
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert_eq!(log.matches("Inventory complete").count(), 2);
}

#[tokio::test]
async fn consent_is_requested_when_asked() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        register_consent: true,
        ..config_in(dir.path())
    };
    let mut connector = connected_connector();
    connector
        .expect_request_management_consent()
        .withf(|tenant| tenant == "contoso")
        .times(1)
        .returning(|_| Ok("Open https://login.example/consent".to_string()));
    let mut lister = MockLister::new();
    lister.expect_list_sites().returning(|_, _| Ok(vec![]));
    let mut sink = sink_for(&config);

    run_inventory(&config, &connector, &lister, &mut sink)
        .await
        .unwrap();

    let log = fs::read_to_string(config.log_path()).unwrap();
    assert!(log.contains("https://login.example/consent"));
}

#[tokio::test]
async fn consent_is_skipped_without_a_tenant() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        register_consent: true,
        log_dir: dir.path().join("logs"),
        ..RunConfig::default()
    };
    let mut connector = MockConnector::new();
    connector.expect_request_management_consent().times(0);
    let mut sink = sink_for(&config);

    let result = run_inventory(&config, &connector, &MockLister::new(), &mut sink).await;

    assert!(matches!(result, Err(InventoryError::MissingTenant)));
    let log = fs::read_to_string(config.log_path()).unwrap();
    assert_eq!(error_lines(&log), 1);
    assert!(!log.contains("onmicrosoft.com"));
}

#[tokio::test]
async fn unusable_log_directory_aborts() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();
    let config = RunConfig {
        tenant: "contoso".into(),
        log_dir: blocker.join("logs"),
        ..RunConfig::default()
    };
    let mut sink = sink_for(&config);

    let result = run_inventory(&config, &MockConnector::new(), &MockLister::new(), &mut sink).await;

    assert!(matches!(result, Err(InventoryError::LogDirectory { .. })));
    let console = String::from_utf8(sink.into_console()).unwrap();
    assert!(console.contains("[ERROR]"));
}
