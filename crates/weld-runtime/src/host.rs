//! Host assembly: open rule builders, apply extensions, build the registry.
//!
//! ```rust,ignore
//! let config = weld_runtime::config::load_config()?;
//! let mut host = HostConfiguration::from_config(&config)?;
//! host.with_registered_extensions()?;
//! host.open_rule_builder::<TimerMarker>().bind_to_trigger::<TimerInfo>()?;
//!
//! let host = host.build()?;
//! println!("{}", host.dump_rule_graphs());
//! ```

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use weld_core::{
    BindError, BindResult, ConfigResult, EnvNameResolver, Marker, NameResolver,
    ParameterInfo, Services, SharedNameResolver,
};
use weld_framework::{
    CompositeBindingProvider, ConverterManager, ExtensionRegistry, ParameterBinding, RuleBuilder,
    RuleState, SharedConverters, SharedServices,
};

use crate::config::WeldConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::extension::{ExtensionDescriptor, registered_extensions};
use crate::resolver::SettingsNameResolver;

/// A rule builder of any marker type.
trait PendingRule {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn marker_name(&self) -> &'static str;
    fn state(&self) -> RuleState;
    fn finalize(&mut self, registry: &mut ExtensionRegistry) -> ConfigResult<()>;
}

impl<M: Marker> PendingRule for RuleBuilder<M> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn marker_name(&self) -> &'static str {
        M::NAME
    }

    fn state(&self) -> RuleState {
        RuleBuilder::state(self)
    }

    fn finalize(&mut self, registry: &mut ExtensionRegistry) -> ConfigResult<()> {
        RuleBuilder::finalize(self, registry)
    }
}

// =============================================================================
// HostConfiguration
// =============================================================================

/// Collects binding rules before the host starts.
///
/// One [`RuleBuilder`] exists per marker type; opening the same marker
/// twice returns the same builder. Converters and services are shared by
/// every builder of the host.
pub struct HostConfiguration {
    rules: Vec<Box<dyn PendingRule>>,
    index: HashMap<TypeId, usize>,
    converters: SharedConverters,
    services: SharedServices,
    resolver: SharedNameResolver,
    applied: HashSet<&'static str>,
}

impl Default for HostConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConfiguration {
    /// Creates a host that resolves `%token%` names from the environment.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            index: HashMap::new(),
            converters: Arc::new(RwLock::new(ConverterManager::new())),
            services: Arc::new(RwLock::new(Services::new())),
            resolver: Arc::new(EnvNameResolver),
            applied: HashSet::new(),
        }
    }

    /// Creates a host resolving names from `host.settings` of a validated config.
    pub fn from_config(config: &WeldConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::new().with_name_resolver(SettingsNameResolver::new(&config.host)))
    }

    /// Replaces the name resolver.
    pub fn with_name_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Returns the builder for `M`, opening it on first use.
    pub fn open_rule_builder<M: Marker>(&mut self) -> &mut RuleBuilder<M> {
        let key = TypeId::of::<M>();
        let position = match self.index.get(&key).copied() {
            Some(position) => position,
            None => {
                debug!(marker = M::NAME, "Opening rule builder");
                let builder = RuleBuilder::<M>::new(
                    Arc::clone(&self.converters),
                    Arc::clone(&self.services),
                );
                self.rules.push(Box::new(builder));
                self.index.insert(key, self.rules.len() - 1);
                self.rules.len() - 1
            }
        };

        match self.rules[position]
            .as_any_mut()
            .downcast_mut::<RuleBuilder<M>>()
        {
            Some(builder) => builder,
            None => unreachable!("rule builder indexed under a foreign marker type"),
        }
    }

    /// Registers `F -> T` for every rule of this host.
    pub fn add_converter<F, T, C>(&mut self, convert: C) -> &mut Self
    where
        F: Send + 'static,
        T: Send + 'static,
        C: Fn(F) -> BindResult<T> + Send + Sync + 'static,
    {
        self.converters.write().add_converter(convert);
        self
    }

    /// Returns the host-wide converter manager.
    pub fn converters(&self) -> SharedConverters {
        Arc::clone(&self.converters)
    }

    /// Makes a service available to constructible converters.
    pub fn add_service<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.write().insert(service);
        self
    }

    /// Applies one extension; a name already applied is skipped.
    pub fn add_extension(&mut self, extension: ExtensionDescriptor) -> RuntimeResult<&mut Self> {
        if !self.applied.insert(extension.name) {
            debug!(extension = extension.name, "Extension already applied, skipping");
            return Ok(self);
        }
        debug!(extension = extension.name, "Applying extension");
        (extension.init)(self).map_err(|source| RuntimeError::Extension {
            name: extension.name,
            source,
        })?;
        Ok(self)
    }

    /// Applies every `#[register_extension]` initializer linked into the binary.
    pub fn with_registered_extensions(&mut self) -> RuntimeResult<&mut Self> {
        let extensions = registered_extensions();
        info!(count = extensions.len(), "Applying registered extensions");
        for extension in extensions {
            self.add_extension(extension)?;
        }
        Ok(self)
    }

    /// Returns the names of the applied extensions.
    pub fn applied_extensions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.applied.iter().copied().collect();
        names.sort_unstable();
        names
    }

    /// Returns each opened marker with its builder state, in opening order.
    pub fn rule_states(&self) -> Vec<(&'static str, RuleState)> {
        self.rules
            .iter()
            .map(|r| (r.marker_name(), r.state()))
            .collect()
    }

    /// Finalizes every builder, in opening order.
    ///
    /// Aborts on the first configuration error.
    pub fn build(mut self) -> RuntimeResult<JobHost> {
        let mut registry = ExtensionRegistry::new();
        for rule in &mut self.rules {
            rule.finalize(&mut registry)?;
        }
        info!(
            markers = registry.len(),
            extensions = self.applied.len(),
            "Job host built"
        );

        Ok(JobHost {
            registry,
            resolver: self.resolver,
        })
    }
}

impl fmt::Debug for HostConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfiguration")
            .field("rules", &self.rule_states())
            .field("extensions", &self.applied_extensions())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// JobHost
// =============================================================================

/// A built host: the registry plus the name resolver used for every resolution.
pub struct JobHost {
    registry: ExtensionRegistry,
    resolver: SharedNameResolver,
}

impl JobHost {
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &SharedNameResolver {
        &self.resolver
    }

    /// Returns the composite provider of `M`.
    pub fn provider<M: Marker>(&self) -> Option<CompositeBindingProvider<M>> {
        self.registry.provider::<M>()
    }

    /// Resolves one parameter with the host's name resolver.
    pub fn resolve<M: Marker>(
        &self,
        marker: &M,
        parameter: &ParameterInfo,
    ) -> BindResult<ParameterBinding> {
        match self.registry.provider::<M>() {
            Some(provider) => provider.resolve(marker, parameter, self.resolver.as_ref()),
            None => Err(BindError::NoApplicableBinding {
                marker: M::NAME,
                parameter: parameter.name.clone(),
                param_type: parameter.param_type.name(),
            }),
        }
    }

    /// Renders the rule graph of every registered marker.
    pub fn dump_rule_graphs(&self) -> String {
        self.registry.dump_all()
    }
}

impl fmt::Debug for JobHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHost")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
