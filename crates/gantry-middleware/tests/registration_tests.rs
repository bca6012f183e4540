//! Registration store semantics: deduplication, alias expansion, unshift and
//! configuration-driven bootstrap.

mod support;

use std::sync::Arc;

use gantry_core::{AppConfigTrait, MiddlewareConfig};
use gantry_middleware::{
    Category, MiddlewareError, MiddlewareManager, MiddlewareRegistry, Next, Params, Registration,
    Request,
};
use serde_json::json;
use support::{manager, Trace};

fn empty_manager(config: MiddlewareConfig) -> MiddlewareManager {
    MiddlewareManager::new(config, Arc::new(MiddlewareRegistry::default()))
}

fn queue(manager: &MiddlewareManager, category: Category) -> Vec<String> {
    manager
        .all(category)
        .iter()
        .map(|descriptor| descriptor.to_string())
        .collect()
}

fn passthrough() -> Registration {
    Registration::inline(|request: Request, next: Next, _params: Params| async move {
        next.run(request).await
    })
}

#[test]
fn test_add_deduplicates_keeping_first_occurrence() {
    let mut manager = empty_manager(MiddlewareConfig::new());

    manager.add("a", Category::GLOBAL).unwrap();
    manager.add("b", Category::GLOBAL).unwrap();
    manager.add("a", Category::GLOBAL).unwrap();
    manager.add("c", Category::GLOBAL).unwrap();
    manager
        .add(Registration::named("b").with_params([json!(1)]), Category::GLOBAL)
        .unwrap();
    manager
        .add(Registration::try_from(json!(["b", [1]])).unwrap(), Category::GLOBAL)
        .unwrap();

    assert_eq!(queue(&manager, Category::GLOBAL), ["a", "b", "c", "b[1]"]);
}

#[test]
fn test_inline_stages_deduplicate_by_identity() {
    let mut manager = empty_manager(MiddlewareConfig::new());
    let stage = passthrough();

    manager.add(stage.clone(), Category::GLOBAL).unwrap();
    manager.add(stage, Category::GLOBAL).unwrap();
    assert_eq!(manager.all(Category::GLOBAL).len(), 1);

    // behaviourally identical closures are still distinct stages
    manager.add(passthrough(), Category::GLOBAL).unwrap();
    assert_eq!(manager.all(Category::GLOBAL).len(), 2);
}

#[test]
fn test_alias_group_expands_into_leaves_in_order() {
    let config = MiddlewareConfig::new().with_alias_group(
        "web",
        vec![
            gantry_core::MiddlewareEntry::from("session"),
            gantry_core::MiddlewareEntry::WithParams("throttle".to_string(), vec![json!(60)]),
            gantry_core::MiddlewareEntry::from("csrf"),
        ],
    );
    let mut manager = empty_manager(config);

    manager.add("log", Category::GLOBAL).unwrap();
    manager.add("web", Category::GLOBAL).unwrap();

    let entries = queue(&manager, Category::GLOBAL);
    assert_eq!(entries, ["log", "session", "throttle[60]", "csrf"]);
    assert!(manager.all(Category::GLOBAL).iter().all(|d| d.name() != "web"));
}

#[test]
fn test_alias_group_into_same_category_only() {
    let config = MiddlewareConfig::new().with_alias_group("api", ["cors", "json"]);
    let mut manager = empty_manager(config);

    manager.route("api").unwrap();

    assert_eq!(queue(&manager, Category::ROUTE), ["cors", "json"]);
    assert!(manager.all(Category::GLOBAL).is_empty());
}

#[test]
fn test_unshift_prepends_without_deduplication() {
    let mut manager = empty_manager(MiddlewareConfig::new());

    manager.add("b", Category::GLOBAL).unwrap();
    manager.unshift("a", Category::GLOBAL).unwrap();
    manager.unshift("a", Category::GLOBAL).unwrap();
    assert_eq!(queue(&manager, Category::GLOBAL), ["a", "a", "b"]);

    // the next add deduplicates the whole queue
    manager.add("c", Category::GLOBAL).unwrap();
    assert_eq!(queue(&manager, Category::GLOBAL), ["a", "b", "c"]);
}

#[test]
fn test_unshift_alias_group_appends_members() {
    let config = MiddlewareConfig::new()
        .with_alias("auth", "app::Authenticate")
        .with_alias_group("web", ["session", "csrf"]);
    let mut manager = empty_manager(config);

    manager.add("log", Category::GLOBAL).unwrap();
    manager.unshift("web", Category::GLOBAL).unwrap();
    manager.unshift("auth", Category::GLOBAL).unwrap();

    assert_eq!(
        queue(&manager, Category::GLOBAL),
        ["app::Authenticate", "log", "session", "csrf"]
    );
}

#[test]
fn test_unshift_creates_category() {
    let mut manager = empty_manager(MiddlewareConfig::new());
    manager.unshift(passthrough(), "admin").unwrap();

    assert_eq!(manager.categories(), [&Category::new("admin")]);
    assert!(manager.all("admin")[0].is_inline());
}

#[test]
fn test_import_stops_at_first_invalid_entry() {
    let mut manager = empty_manager(MiddlewareConfig::new());

    let err = manager.import(["a", "", "b"], Category::GLOBAL).unwrap_err();

    assert!(matches!(err, MiddlewareError::InvalidDescriptor { .. }));
    assert_eq!(queue(&manager, Category::GLOBAL), ["a"]);
}

#[test]
fn test_malformed_config_values_are_rejected() {
    let malformed = [
        json!(1),
        json!(true),
        json!({}),
        json!(["a"]),
        json!([1, []]),
        json!(["a", "b"]),
    ];
    for value in malformed {
        match Registration::try_from(value) {
            Err(MiddlewareError::InvalidDescriptor { .. }) => {}
            other => panic!("expected InvalidDescriptor, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_yaml_configuration_drives_bootstrap() {
    let config = MiddlewareConfig::from_yaml_str(
        r#"
alias:
  auth: app::Authenticate
  web:
    - app::Session
    - [app::Throttle, [60]]
priority:
  - app::Session
  - app::Authenticate
global:
  - web
route:
  - auth
"#,
    )
    .unwrap();
    config.validate().unwrap();

    let trace = Trace::default();
    let registered = ["app::Authenticate", "app::Session", "app::Throttle"];
    let mut manager = manager(config.clone(), &registered, &trace);
    manager.import_config(&config).unwrap();
    manager.add("auth", Category::GLOBAL).unwrap();

    assert_eq!(
        queue(&manager, Category::GLOBAL),
        ["app::Session", "app::Throttle[60]", "app::Authenticate"]
    );
    assert_eq!(queue(&manager, Category::ROUTE), ["app::Authenticate"]);
    assert_eq!(
        manager.pipeline(Category::GLOBAL).names(),
        ["app::Session", "app::Authenticate", "app::Throttle"]
    );

    manager
        .pipeline(Category::GLOBAL)
        .run(Request::get("/"), |_| async { Ok(gantry_middleware::Response::ok()) })
        .await
        .unwrap();

    let entered: Vec<_> = trace
        .events()
        .into_iter()
        .filter(|event| !event.ends_with(":after"))
        .collect();
    assert_eq!(entered, ["app::Session", "app::Authenticate", "app::Throttle[60]"]);
}
