//! Rule building and resolution through a built host.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use weld::framework::{ConverterManager, ExtensionRegistry};
use weld::prelude::*;
use weld::runtime::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, MarkerEnum)]
enum Tier {
    Hot,
    Cold,
}

#[derive(Debug, Clone, Marker)]
#[weld(name = "Blob")]
struct BlobMarker {
    #[weld(auto_resolve)]
    path: String,
    access: Option<FileAccess>,
    tier: Option<Tier>,
    #[weld(skip)]
    #[allow(dead_code)]
    retries: u8,
}

fn blob(access: Option<FileAccess>, tier: Option<Tier>) -> BlobMarker {
    BlobMarker {
        path: "container/item.txt".into(),
        access,
        tier,
        retries: 0,
    }
}

fn all_blobs() -> Vec<BlobMarker> {
    let mut blobs = Vec::new();
    for access in [None, Some(FileAccess::Read), Some(FileAccess::Write)] {
        for tier in [None, Some(Tier::Hot), Some(Tier::Cold)] {
            blobs.push(blob(access, tier));
        }
    }
    blobs
}

fn label(text: &'static str) -> ConverterSource<BlobMarker, String> {
    ConverterSource::from_fn(move |_: &BlobMarker| text.to_string())
}

async fn bind_string(host: &JobHost, marker: &BlobMarker) -> BindResult<String> {
    let binding = host.resolve(marker, &ParameterInfo::of::<String>("value"))?;
    let mut value = binding.bind(ResolutionContext::new()).await?;
    value.take::<String>()
}

// ============================================================================
// Markers
// ============================================================================

#[test]
fn test_derived_marker_properties() {
    assert_eq!(BlobMarker::NAME, "Blob");
    let names: Vec<_> = BlobMarker::properties()
        .iter()
        .map(|p| p.name())
        .collect();
    assert_eq!(names, vec!["path", "access", "tier"]);

    let tier = BlobMarker::property("tier").unwrap();
    assert!(tier.shape().optional);
    assert!(tier.get(&blob(None, None)).is_none());
    assert_eq!(
        tier.get(&blob(None, Some(Tier::Cold))),
        Some(Tier::Cold.into_property_value())
    );
    assert_eq!(Tier::Hot.variant_name(), "Hot");
}

#[test]
fn test_auto_resolve_substitutes_tokens() {
    let marker = BlobMarker {
        path: "%container%/%name%.txt".into(),
        ..blob(None, None)
    };
    let resolver = MapNameResolver::new()
        .with("container", "images")
        .with("name", "cat");

    assert_eq!(marker.resolve(&resolver).unwrap().path, "images/cat.txt");
    assert!(matches!(
        marker.resolve(&MapNameResolver::new().with("container", "images")),
        Err(BindError::UnresolvedToken(ref token)) if token == "name"
    ));
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_null_checks_are_negations() {
    let is_null = FilterClause::<BlobMarker>::is_null("access").unwrap();
    let is_not_null = FilterClause::<BlobMarker>::is_not_null("access").unwrap();

    for marker in all_blobs() {
        assert_ne!(is_null.evaluate(&marker), is_not_null.evaluate(&marker));
    }
}

#[test]
fn test_access_equality() {
    let write = FilterClause::<BlobMarker>::equals("access", FileAccess::Write).unwrap();

    assert!(write.evaluate(&blob(Some(FileAccess::Write), None)));
    assert!(!write.evaluate(&blob(Some(FileAccess::Read), None)));
    assert!(!write.evaluate(&blob(None, None)));
}

#[test]
fn test_filter_registration_errors() {
    let mut builder = RuleBuilder::<BlobMarker>::default();

    assert!(matches!(
        builder.when_is_null("retries"),
        Err(ConfigError::UnknownProperty { .. })
    ));
    assert!(matches!(
        builder.when_eq("path", FileAccess::Write),
        Err(ConfigError::PropertyTypeMismatch { .. })
    ));
    assert!(matches!(
        builder.when_eq("access", Tier::Hot),
        Err(ConfigError::PropertyTypeMismatch { .. })
    ));
    assert!(matches!(
        builder.when_eq("access", true),
        Err(ConfigError::NotAnEnum { .. })
    ));
    assert_eq!(builder.state(), RuleState::Idle);
}

#[tokio::test]
async fn test_filters_commute() {
    let mut forward = HostConfiguration::new();
    forward
        .open_rule_builder::<BlobMarker>()
        .when_is_not_null("access")
        .unwrap()
        .when_eq("tier", Tier::Hot)
        .unwrap()
        .bind_to_input(label("guarded"))
        .unwrap();

    let mut reverse = HostConfiguration::new();
    reverse
        .open_rule_builder::<BlobMarker>()
        .when_eq("tier", Tier::Hot)
        .unwrap()
        .when_is_not_null("access")
        .unwrap()
        .bind_to_input(label("guarded"))
        .unwrap();

    let forward = forward.build().unwrap();
    let reverse = reverse.build().unwrap();
    for marker in all_blobs() {
        let a = bind_string(&forward, &marker).await.ok();
        let b = bind_string(&reverse, &marker).await.ok();
        assert_eq!(a, b, "{marker:?}");
    }
}

#[tokio::test]
async fn test_filters_apply_to_next_bind_only() {
    let mut host = HostConfiguration::new();
    host.open_rule_builder::<BlobMarker>()
        .when_is_not_null("access")
        .unwrap()
        .bind_to_input(label("guarded"))
        .unwrap()
        .done()
        .bind_to_input(label("fallback"))
        .unwrap();
    let host = host.build().unwrap();

    assert_eq!(
        bind_string(&host, &blob(Some(FileAccess::Read), None))
            .await
            .unwrap(),
        "guarded"
    );
    assert_eq!(
        bind_string(&host, &blob(None, None)).await.unwrap(),
        "fallback"
    );
}

// ============================================================================
// Builder state machine
// ============================================================================

#[test]
fn test_hook_double_set_fails_at_second_set() {
    fn hook(_: &BlobMarker, p: &ParameterInfo, _: &dyn NameResolver) -> ParameterDescriptor {
        ParameterDescriptor::new(p.name.clone(), p.param_type.name(), BindingKind::Input)
    }

    let mut builder = RuleBuilder::<BlobMarker>::default();
    builder.set_post_resolve_hook(hook).unwrap();
    assert_eq!(builder.state(), RuleState::HookStaged);

    assert!(matches!(
        builder.set_post_resolve_hook(hook),
        Err(ConfigError::HookAlreadySet { marker: "Blob" })
    ));

    builder.bind_to_input(label("hooked")).unwrap();
    assert_eq!(builder.state(), RuleState::ProviderStaged);
    builder.set_post_resolve_hook(hook).unwrap();
}

#[test]
fn test_dangling_guard_registers_nothing() {
    let mut registry = ExtensionRegistry::new();

    let mut builder = RuleBuilder::<BlobMarker>::default();
    builder.bind_to_input(label("first")).unwrap();
    builder.when_is_null("access").unwrap();
    assert_eq!(builder.state(), RuleState::FiltersStaged);

    let err = builder.finalize(&mut registry).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::DanglingGuard { ref filters, hook: false, .. } if filters == "(access == null)"
    ));
    assert!(registry.is_empty());
    assert!(!registry.contains::<BlobMarker>());
}

#[test]
fn test_dangling_guard_aborts_host_build() {
    let mut host = HostConfiguration::new();
    host.open_rule_builder::<BlobMarker>()
        .when_is_not_null("tier")
        .unwrap();

    assert!(matches!(
        host.build(),
        Err(RuntimeError::Config(ConfigError::DanglingGuard { .. }))
    ));
}

#[derive(Debug, Clone, Marker)]
struct TimerMarker {
    schedule: String,
}

#[test]
fn test_trigger_is_exclusive_in_both_orders() {
    let mut trigger_first = RuleBuilder::<TimerMarker>::default();
    trigger_first.bind_to_trigger::<u64>().unwrap();
    assert!(matches!(
        trigger_first.bind_to_input(ConverterSource::from_fn(|t: &TimerMarker| t.schedule.clone())),
        Err(ConfigError::TriggerConflict { marker: "TimerMarker" })
    ));

    let mut trigger_last = RuleBuilder::<TimerMarker>::default();
    trigger_last
        .bind_to_input(ConverterSource::from_fn(|t: &TimerMarker| t.schedule.clone()))
        .unwrap();
    assert!(matches!(
        trigger_last.bind_to_trigger::<u64>(),
        Err(ConfigError::TriggerConflict { .. })
    ));
    assert_eq!(trigger_last.staged_len(), 1);
}

#[test]
fn test_duplicate_rule_wide_validator() {
    let mut builder = RuleBuilder::<BlobMarker>::default();
    builder.add_validator(|_, _| Ok(())).unwrap();
    assert!(matches!(
        builder.add_validator(|_, _| Ok(())),
        Err(ConfigError::DuplicateValidator { .. })
    ));
}

// ============================================================================
// Composition
// ============================================================================

fn counted<T: Send + 'static>(
    value: T,
    calls: &Arc<AtomicUsize>,
) -> ConverterSource<BlobMarker, T>
where
    T: Clone + Sync,
{
    let calls = Arc::clone(calls);
    ConverterSource::from_fn(move |_: &BlobMarker| {
        calls.fetch_add(1, Ordering::SeqCst);
        value.clone()
    })
}

#[tokio::test]
async fn test_first_match_wins() {
    let (a, b, c) = (
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
    );

    let mut host = HostConfiguration::new();
    let builder = host.open_rule_builder::<BlobMarker>();
    builder.bind_to_input(counted(7u64, &a)).unwrap();
    builder.bind_to_input(counted("b".to_string(), &b)).unwrap();
    builder.bind_to_input(counted("c".to_string(), &c)).unwrap();
    let host = host.build().unwrap();

    assert_eq!(bind_string(&host, &blob(None, None)).await.unwrap(), "b");
    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(c.load(Ordering::SeqCst), 0);
}

#[test]
fn test_no_applicable_binding() {
    let mut host = HostConfiguration::new();
    host.open_rule_builder::<BlobMarker>()
        .when_eq("access", FileAccess::Write)
        .unwrap()
        .bind_to_input(label("write only"))
        .unwrap();
    let host = host.build().unwrap();

    let err = host
        .resolve(&blob(Some(FileAccess::Read), None), &ParameterInfo::of::<String>("value"))
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::NoApplicableBinding { marker: "Blob", ref parameter, .. } if parameter == "value"
    ));
}

#[test]
fn test_rule_graph_dump() {
    let mut host = HostConfiguration::new();
    let builder = host.open_rule_builder::<BlobMarker>();
    builder
        .when_eq("access", FileAccess::Write)
        .unwrap()
        .when_is_not_null("tier")
        .unwrap()
        .bind_to_input(label("guarded"))
        .unwrap()
        .add_validator(|_, _| Ok(()))
        .bind_to_input(label("fallback"))
        .unwrap();
    builder.add_validator(|_, _| Ok(())).unwrap();
    host.open_rule_builder::<TimerMarker>()
        .bind_to_trigger::<u64>()
        .unwrap();
    let host = host.build().unwrap();

    assert_eq!(
        host.registry().dump_rule_graph::<BlobMarker>().unwrap(),
        "Blob\n  validator: rule-wide\n  \
         [0] when (access == Write) && (tier != null) => input [fn -> String] (validated)\n  \
         [1] input [fn -> String]"
    );
    assert_eq!(
        host.dump_rule_graphs(),
        format!(
            "{}\n\nTimerMarker\n  [0] trigger [payload u64]",
            host.registry().dump_rule_graph::<BlobMarker>().unwrap()
        )
    );
    assert_eq!(host.registry().markers(), vec!["Blob", "TimerMarker"]);
}

#[test]
fn test_validators_reject_before_binding() {
    let mut host = HostConfiguration::new()
        .with_name_resolver(MapNameResolver::new().with("container", ".."));
    host.open_rule_builder::<BlobMarker>()
        .add_validator(|m: &BlobMarker, _: &TypeKey| {
            if m.path.contains("..") {
                Err::<(), BoxError>("path escapes the container".into())
            } else {
                Ok(())
            }
        })
        .unwrap()
        .bind_to_input(label("ok"))
        .unwrap();
    let host = host.build().unwrap();

    let marker = BlobMarker {
        path: "%container%/item".into(),
        ..blob(None, None)
    };
    let err = host
        .resolve(&marker, &ParameterInfo::of::<String>("value"))
        .unwrap_err();
    assert!(matches!(err, BindError::Config(ConfigError::Validation { .. })));
}

// ============================================================================
// Converters
// ============================================================================

struct Endpoint(String);

struct PrefixConverter {
    prefix: String,
}

impl Constructible for PrefixConverter {
    type Args = &'static str;

    fn construct(args: Self::Args, services: &Services) -> ConfigResult<Self> {
        let endpoint = services.require::<Endpoint>()?;
        Ok(Self {
            prefix: format!("{}/{args}", endpoint.0),
        })
    }
}

impl Converter<BlobMarker, String> for PrefixConverter {
    fn convert(&self, marker: &BlobMarker) -> Result<String, BoxError> {
        Ok(format!("{}/{}", self.prefix, marker.path))
    }
}

#[tokio::test]
async fn test_constructible_converter_fails_at_registration() {
    let mut host = HostConfiguration::new();
    let err = host
        .open_rule_builder::<BlobMarker>()
        .bind_to_input(ConverterSource::construct::<PrefixConverter>("v1"))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::MissingService(_)));

    host.add_service(Arc::new(Endpoint("https://blobs".into())));
    host.open_rule_builder::<BlobMarker>()
        .bind_to_input(ConverterSource::construct::<PrefixConverter>("v1"))
        .unwrap();
    let host = host.build().unwrap();

    assert_eq!(
        bind_string(&host, &blob(None, None)).await.unwrap(),
        "https://blobs/v1/container/item.txt"
    );
    assert!(
        host.registry()
            .dump_rule_graph::<BlobMarker>()
            .unwrap()
            .contains("constructed PrefixConverter -> String")
    );
}

#[test]
fn test_try_get_converter_func_fails_fast() {
    let mut converters = ConverterManager::new();
    assert!(matches!(
        converters.try_get_converter_func::<u64, String>(),
        Err(ConfigError::NoConverter { .. })
    ));

    converters.add_converter(|n: u64| Ok(n.to_string()));
    let convert = converters.try_get_converter_func::<u64, String>().unwrap();
    assert_eq!(convert.call(42).unwrap(), "42");
}

#[tokio::test]
async fn test_registered_conversion_extends_input() {
    let mut host = HostConfiguration::new();
    host.add_converter(|n: u64| Ok(format!("#{n}")));
    host.open_rule_builder::<BlobMarker>()
        .bind_to_input(ConverterSource::from_fn(|_: &BlobMarker| 7u64))
        .unwrap();
    let host = host.build().unwrap();

    assert_eq!(bind_string(&host, &blob(None, None)).await.unwrap(), "#7");
}
