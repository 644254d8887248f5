//! Named per-element feature functions.
//!
//! An extra is a pure function from one [`AgentBatchElement`] to an array.
//! Extras are registered by name in an [`ExtrasRegistry`], computed once per
//! element before collation, and stacked into `AgentBatch::extras`.

use nalgebra::DMatrix;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::element::AgentBatchElement;
use crate::error::{BatchError, ExtraFnError, ExtrasError};

/// A pure feature function over one batch element.
///
/// Implementations must not mutate shared state; the same function is called
/// concurrently for different elements and may be re-run on the same element.
pub trait ElementExtraFn: Send + Sync {
    fn compute(&self, element: &AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError>;
}

impl<F> ElementExtraFn for F
where
    F: Fn(&AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError> + Send + Sync,
{
    fn compute(&self, element: &AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError> {
        self(element)
    }
}

/// Name-keyed set of extra functions. Iterates in name order.
#[derive(Clone, Default)]
pub struct ExtrasRegistry {
    fns: BTreeMap<String, Arc<dyn ElementExtraFn>>,
}

impl ExtrasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under `name`.
    ///
    /// Names must be non-empty and unique within the registry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl ElementExtraFn + 'static,
    ) -> Result<(), ExtrasError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ExtrasError::EmptyName);
        }
        if self.fns.contains_key(&name) {
            return Err(ExtrasError::DuplicateName { name });
        }
        self.fns.insert(name, Arc::new(f));
        Ok(())
    }

    /// Registers a closure. Same rules as [`register`](Self::register);
    /// exists so closure signatures are inferred.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), ExtrasError>
    where
        F: Fn(&AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        f: impl ElementExtraFn + 'static,
    ) -> Result<Self, ExtrasError> {
        self.register(name, f)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ElementExtraFn)> {
        self.fns.iter().map(|(k, f)| (k.as_str(), f.as_ref()))
    }
}

impl fmt::Debug for ExtrasRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtrasRegistry")
            .field("names", &self.fns.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Computes every registered extra for `element` and caches the results in
/// `element.extras`.
///
/// Names already present in the cache are skipped, so repeated calls do no
/// extra work. The first failure is returned as
/// [`BatchError::ExtraComputationFailure`] tagged with `element_index`.
pub fn compute_extras(
    element: &mut AgentBatchElement,
    registry: &ExtrasRegistry,
    element_index: usize,
) -> Result<(), BatchError> {
    for (name, f) in registry.iter() {
        if element.extras.contains_key(name) {
            continue;
        }
        let value = f
            .compute(element)
            .map_err(|source| BatchError::ExtraComputationFailure {
                name: name.to_string(),
                element_index,
                data_index: element.data_index,
                source,
            })?;
        element.extras.insert(name.to_string(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::test_support::element;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn future_len(el: &AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError> {
        Ok(DMatrix::from_element(1, 1, el.future_len() as f64))
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut reg = ExtrasRegistry::new();
        reg.register("fut_len", future_len).unwrap();
        assert_eq!(
            reg.register("fut_len", future_len),
            Err(ExtrasError::DuplicateName {
                name: "fut_len".to_string()
            })
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut reg = ExtrasRegistry::new();
        assert_eq!(reg.register("", future_len), Err(ExtrasError::EmptyName));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_names_are_ordered() {
        let reg = ExtrasRegistry::new()
            .with("zeta", future_len)
            .unwrap()
            .with("alpha", future_len)
            .unwrap();
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_compute_extras_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reg = ExtrasRegistry::new();
        reg.register_fn("count", move |_el| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(DMatrix::zeros(1, 1))
        })
        .unwrap();

        let mut el = element("s", 0, "a", 3, 4);
        compute_extras(&mut el, &reg, 0).unwrap();
        compute_extras(&mut el, &reg, 0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(el.extras.contains_key("count"));
    }

    #[test]
    fn test_compute_extras_reports_failure() {
        let mut reg = ExtrasRegistry::new();
        reg.register_fn("broken", |_el| Err("no lane data".into())).unwrap();

        let mut el = element("s", 0, "a", 3, 4);
        el.data_index = 17;
        let err = compute_extras(&mut el, &reg, 2).unwrap_err();
        match err {
            BatchError::ExtraComputationFailure {
                name,
                element_index,
                data_index,
                source,
            } => {
                assert_eq!(name, "broken");
                assert_eq!(element_index, 2);
                assert_eq!(data_index, 17);
                assert_eq!(source.to_string(), "no lane data");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(el.extras.is_empty());
    }
}
