//! The converter graph: typed conversion edges, chain synthesis and cached lookup.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::{SmallVec, smallvec};

use crate::error::ConversionError;
use crate::runtime::{RuntimeType, TypeHierarchy, Value};

bitflags! {
    /// Restrictions on how a converter may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConverterOptions: u8 {
        /// No other converter may be applied before this one.
        const NO_LEFT_CHAINING = 1;
        /// No other converter may be applied after this one.
        const NO_RIGHT_CHAINING = 2;
        const NO_CHAINING = Self::NO_LEFT_CHAINING.bits() | Self::NO_RIGHT_CHAINING.bits();
        /// Not used to parse command arguments.
        const NO_COMMAND_ARGUMENTS = 4;
    }
}

/// A conversion function. Returning `None` means the value can't be converted.
pub type ConverterFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// One edge of the graph.
#[derive(Clone)]
pub struct ConverterInfo {
    pub from: RuntimeType,
    pub to: RuntimeType,
    pub converter: ConverterFn,
    pub options: ConverterOptions,
    /// Registration sequence number; synthesized edges continue the sequence.
    pub sequence: usize,
    chain: SmallVec<[RuntimeType; 4]>,
}

impl ConverterInfo {
    pub fn new(from: RuntimeType, to: RuntimeType, converter: ConverterFn, options: ConverterOptions) -> Self {
        Self {
            from,
            to,
            converter,
            options,
            sequence: 0,
            chain: smallvec![from, to],
        }
    }

    /// An edge from a typed function.
    pub fn typed<F, T>(convert: impl Fn(&F) -> Option<T> + Send + Sync + 'static, options: ConverterOptions) -> Self
    where
        F: Any + Send + Sync,
        T: Any + Send + Sync,
    {
        let converter: ConverterFn = Arc::new(move |value: &Value| value.downcast_ref::<F>().and_then(&convert).map(Value::new));
        Self::new(RuntimeType::of::<F>(), RuntimeType::of::<T>(), converter, options)
    }

    /// `first` then `second`. `None` from `first` short-circuits.
    fn chained(first: &Self, second: &Self, sequence: usize) -> Self {
        let (f, g) = (Arc::clone(&first.converter), Arc::clone(&second.converter));
        let mut chain = first.chain.clone();
        for &ty in &second.chain {
            if chain.last() != Some(&ty) {
                chain.push(ty);
            }
        }
        Self {
            from: first.from,
            to: second.to,
            converter: Arc::new(move |value: &Value| f(value).and_then(|middle| g(&middle))),
            options: first.options | second.options,
            sequence,
            chain,
        }
    }

    /// Every type the conversion passes through, in order.
    #[must_use]
    pub fn chain(&self) -> &[RuntimeType] {
        &self.chain
    }

    #[must_use]
    pub fn is_chained(&self) -> bool {
        self.chain.len() > 2
    }

    #[must_use]
    pub fn chain_display(&self) -> String {
        self.chain.iter().map(RuntimeType::name).collect::<Vec<_>>().join(" -> ")
    }
}

impl fmt::Debug for ConverterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConverterInfo(#{}: {}, {:?})", self.sequence, self.chain_display(), self.options)
    }
}

/// Insert `info` in front of the first edge it strictly narrows. Edges with
/// the same endpoints and unrelated edges keep registration order.
pub(crate) fn insert_edge(edges: &mut Vec<ConverterInfo>, info: ConverterInfo, hierarchy: &TypeHierarchy) {
    let position = edges.iter().position(|existing| {
        (existing.from, existing.to) != (info.from, info.to)
            && hierarchy.is_assignable_from(existing.from, info.from)
            && hierarchy.is_assignable_from(info.to, existing.to)
    });
    match position {
        Some(index) => edges.insert(index, info),
        None => edges.push(info),
    }
}

fn exists_slow(edges: &[ConverterInfo], from: RuntimeType, to: RuntimeType, hierarchy: &TypeHierarchy) -> bool {
    edges
        .iter()
        .any(|edge| hierarchy.related(edge.from, from) && hierarchy.related(edge.to, to))
}

/// Add a chained edge for every pair of edges that can be composed and whose
/// endpoints are not already covered. New edges take part in later pairs.
pub(crate) fn create_missing_converters(edges: &mut Vec<ConverterInfo>, hierarchy: &TypeHierarchy) -> usize {
    let before = edges.len();
    let mut sequence = edges.iter().map(|edge| edge.sequence + 1).max().unwrap_or(0);
    let mut i = 0;
    while i < edges.len() {
        let mut j = 0;
        while j < edges.len() {
            let (first, second) = (&edges[i], &edges[j]);
            let chained = if !first.options.contains(ConverterOptions::NO_RIGHT_CHAINING)
                && !second.options.contains(ConverterOptions::NO_LEFT_CHAINING)
                && hierarchy.is_assignable_from(second.from, first.to)
                && first.from != second.to
                && !exists_slow(edges, first.from, second.to, hierarchy)
            {
                Some(ConverterInfo::chained(first, second, sequence))
            } else if !first.options.contains(ConverterOptions::NO_LEFT_CHAINING)
                && !second.options.contains(ConverterOptions::NO_RIGHT_CHAINING)
                && hierarchy.is_assignable_from(first.from, second.to)
                && second.from != first.to
                && !exists_slow(edges, second.from, first.to, hierarchy)
            {
                Some(ConverterInfo::chained(second, first, sequence))
            } else {
                None
            };
            if let Some(chained) = chained {
                tracing::trace!(chain = %chained.chain_display(), "synthesized converter");
                edges.push(chained);
                sequence += 1;
            }
            j += 1;
        }
        i += 1;
    }
    edges.len() - before
}

/// The frozen converter graph with a lookup cache.
pub struct ConverterGraph {
    hierarchy: Arc<TypeHierarchy>,
    edges: Vec<ConverterInfo>,
    cache: RwLock<HashMap<(TypeId, TypeId), Option<ConverterFn>>>,
}

impl ConverterGraph {
    /// Order the edges, which must be in registration order, and close them transitively.
    pub(crate) fn build(hierarchy: Arc<TypeHierarchy>, registered: Vec<ConverterInfo>) -> Self {
        let mut edges = Vec::with_capacity(registered.len());
        for (sequence, mut info) in registered.into_iter().enumerate() {
            info.sequence = sequence;
            insert_edge(&mut edges, info, &hierarchy);
        }
        let created = create_missing_converters(&mut edges, &hierarchy);
        tracing::debug!(edges = edges.len(), created, "converter graph closed");
        Self {
            hierarchy,
            edges,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn edges(&self) -> &[ConverterInfo] {
        &self.edges
    }

    #[must_use]
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// A converter from `from` to `to`, searching narrow matches first.
    ///
    /// Results, including misses, are cached per type pair.
    #[must_use]
    pub fn get_converter(&self, from: RuntimeType, to: RuntimeType) -> Option<ConverterFn> {
        let key = (from.id(), to.id());
        if let Some(cached) = self.cache.read().get(&key) {
            return cached.clone();
        }
        let found = self.find_converter(from, to);
        self.cache.write().insert(key, found.clone());
        found
    }

    fn find_converter(&self, from: RuntimeType, to: RuntimeType) -> Option<ConverterFn> {
        let h = &*self.hierarchy;
        if let Some(edge) = self
            .edges
            .iter()
            .find(|edge| h.is_assignable_from(edge.from, from) && h.is_assignable_from(to, edge.to))
        {
            return Some(Arc::clone(&edge.converter));
        }
        for edge in &self.edges {
            if h.is_assignable_from(edge.from, from) && h.is_assignable_from(edge.to, to) {
                return Some(self.checked(edge, None, Some(to)));
            }
            if h.is_assignable_from(from, edge.from) && h.is_assignable_from(to, edge.to) {
                return Some(self.checked(edge, Some(edge.from), None));
            }
        }
        self.edges
            .iter()
            .find(|edge| h.is_assignable_from(from, edge.from) && h.is_assignable_from(edge.to, to))
            .map(|edge| self.checked(edge, Some(edge.from), Some(to)))
    }

    /// Wrap an edge that is wider than the query with runtime instance checks.
    fn checked(&self, edge: &ConverterInfo, input: Option<RuntimeType>, output: Option<RuntimeType>) -> ConverterFn {
        let hierarchy = Arc::clone(&self.hierarchy);
        let converter = Arc::clone(&edge.converter);
        Arc::new(move |value: &Value| {
            if input.is_some_and(|ty| !hierarchy.is_instance(ty, value)) {
                return None;
            }
            let converted = converter(value)?;
            if output.is_some_and(|ty| !hierarchy.is_instance(ty, &converted)) {
                return None;
            }
            Some(converted)
        })
    }

    /// The first edge whose endpoints fit exactly, without instance checks.
    #[must_use]
    pub fn get_converter_strictly(&self, from: RuntimeType, to: RuntimeType) -> Option<&ConverterInfo> {
        self.edges.iter().find(|edge| {
            self.hierarchy.is_assignable_from(edge.from, from) && self.hierarchy.is_assignable_from(to, edge.to)
        })
    }

    /// Whether values of `from` can become `to`; assignability in either direction counts.
    #[must_use]
    pub fn converter_exists(&self, from: RuntimeType, to: RuntimeType) -> bool {
        self.hierarchy.related(from, to) || self.get_converter(from, to).is_some()
    }

    /// Convert `value` to `to`. Values already of type `to` are returned as is.
    #[must_use]
    pub fn convert(&self, value: Option<&Value>, to: RuntimeType) -> Option<Value> {
        let value = value?;
        if self.hierarchy.is_instance(to, value) {
            return Some(value.clone());
        }
        let converter = self.get_converter(value.runtime_type(), to)?;
        converter(value)
    }

    /// Convert to the first of `targets` that works.
    #[must_use]
    pub fn convert_to_any(&self, value: &Value, targets: &[RuntimeType]) -> Option<Value> {
        targets.iter().find_map(|&to| self.convert(Some(value), to))
    }

    /// Convert every value, dropping those that can't be converted.
    #[must_use]
    pub fn convert_all(&self, values: &[Value], to: RuntimeType) -> Vec<Value> {
        values.iter().filter_map(|value| self.convert(Some(value), to)).collect()
    }

    pub fn convert_strictly(&self, value: &Value, to: RuntimeType) -> Result<Value, ConversionError> {
        self.convert(Some(value), to).ok_or(ConversionError {
            from: value.runtime_type(),
            to,
        })
    }

    /// Convert with the first exactly fitting edge, without instance checks.
    #[must_use]
    pub fn convert_unsafe(&self, value: &Value, to: RuntimeType) -> Option<Value> {
        if self.hierarchy.is_instance(to, value) {
            return Some(value.clone());
        }
        let edge = self.get_converter_strictly(value.runtime_type(), to)?;
        (edge.converter)(value)
    }
}

impl fmt::Debug for ConverterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterGraph").field("edges", &self.edges).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A(i32);
    struct B(i32);
    struct C(i32);
    enum Number {}

    fn graph(edges: Vec<ConverterInfo>, hierarchy: TypeHierarchy) -> ConverterGraph {
        ConverterGraph::build(Arc::new(hierarchy), edges)
    }

    #[test]
    fn test_chain_synthesis_and_short_circuit() {
        let graph = graph(
            vec![
                ConverterInfo::typed(|a: &A| (a.0 >= 0).then_some(B(a.0 * 2)), ConverterOptions::empty()),
                ConverterInfo::typed(|b: &B| Some(C(b.0 + 1)), ConverterOptions::empty()),
            ],
            TypeHierarchy::new(),
        );
        let chained = graph.edges().iter().find(|edge| edge.is_chained()).unwrap();
        assert!(chained.chain_display().ends_with("::C"));
        assert_eq!(chained.chain().len(), 3);

        let converter = graph.get_converter(RuntimeType::of::<A>(), RuntimeType::of::<C>()).unwrap();
        let c = converter(&Value::new(A(4))).unwrap();
        assert_eq!(c.downcast_ref::<C>().unwrap().0, 9);
        assert!(converter(&Value::new(A(-1))).is_none());
    }

    #[test]
    fn test_no_chaining_flags() {
        let graph = graph(
            vec![
                ConverterInfo::typed(|a: &A| Some(B(a.0)), ConverterOptions::NO_RIGHT_CHAINING),
                ConverterInfo::typed(|b: &B| Some(C(b.0)), ConverterOptions::empty()),
            ],
            TypeHierarchy::new(),
        );
        assert_eq!(graph.edges().len(), 2);
        assert!(!graph.converter_exists(RuntimeType::of::<A>(), RuntimeType::of::<C>()));
    }

    #[test]
    fn test_closure_is_idempotent() {
        let hierarchy = TypeHierarchy::new();
        let mut edges = vec![
            ConverterInfo::typed(|a: &A| Some(B(a.0)), ConverterOptions::empty()),
            ConverterInfo::typed(|b: &B| Some(C(b.0)), ConverterOptions::empty()),
        ];
        assert_eq!(create_missing_converters(&mut edges, &hierarchy), 1);
        assert_eq!(create_missing_converters(&mut edges, &hierarchy), 0);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_insertion_prefers_narrow_edges() {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.declare(RuntimeType::of::<i64>(), RuntimeType::of::<Number>()).unwrap();
        let wide = ConverterInfo::new(
            RuntimeType::of::<Number>(),
            RuntimeType::of::<String>(),
            Arc::new(|_: &Value| Some(Value::new("number".to_owned()))),
            ConverterOptions::empty(),
        );
        let narrow = ConverterInfo::typed(|n: &i64| Some(format!("int {n}")), ConverterOptions::empty());
        let graph = graph(vec![wide, narrow], hierarchy);

        assert_eq!(graph.edges()[0].from, RuntimeType::of::<i64>());
        let text = graph.convert(Some(&Value::new(3_i64)), RuntimeType::of::<String>()).unwrap();
        assert_eq!(text.downcast_ref::<String>().unwrap(), "int 3");
    }

    #[test]
    fn test_earlier_registration_wins_ties() {
        let graph = graph(
            vec![
                ConverterInfo::typed(|_: &u8| Some("first".to_owned()), ConverterOptions::empty()),
                ConverterInfo::typed(|_: &u8| Some("second".to_owned()), ConverterOptions::empty()),
            ],
            TypeHierarchy::new(),
        );

        let sequences: Vec<usize> = graph.edges().iter().map(|edge| edge.sequence).collect();
        assert_eq!(sequences, [0, 1]);
        let text = graph.convert(Some(&Value::new(7_u8)), RuntimeType::of::<String>()).unwrap();
        assert_eq!(text.downcast_ref::<String>().unwrap(), "first");
    }

    #[test]
    fn test_instance_checked_lookup() {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.declare(RuntimeType::of::<i64>(), RuntimeType::of::<Number>()).unwrap();
        hierarchy.declare(RuntimeType::of::<f64>(), RuntimeType::of::<Number>()).unwrap();
        let graph = graph(
            vec![ConverterInfo::typed(|n: &i64| Some(*n as f64), ConverterOptions::empty())],
            hierarchy,
        );

        // number -> f64 only works for numbers that happen to be i64.
        let converter = graph.get_converter(RuntimeType::of::<Number>(), RuntimeType::of::<f64>()).unwrap();
        assert_eq!(converter(&Value::new(2_i64)).unwrap().downcast_ref::<f64>(), Some(&2.0));
        assert!(converter(&Value::new(true)).is_none());

        // i64 -> number: identity by assignability.
        assert!(graph.converter_exists(RuntimeType::of::<i64>(), RuntimeType::of::<Number>()));
        assert!(graph.get_converter(RuntimeType::of::<bool>(), RuntimeType::of::<f64>()).is_none());
        assert!(graph.get_converter(RuntimeType::of::<bool>(), RuntimeType::of::<f64>()).is_none());
    }

    #[test]
    fn test_convert_variants() {
        let graph = graph(
            vec![ConverterInfo::typed(|n: &i64| u8::try_from(*n).ok(), ConverterOptions::empty())],
            TypeHierarchy::new(),
        );
        let to = RuntimeType::of::<u8>();
        assert!(graph.convert(None, to).is_none());

        let values = [Value::new(1_i64), Value::new(1000_i64), Value::new(2_u8)];
        let converted = graph.convert_all(&values, to);
        assert_eq!(converted.len(), 2);
        assert!(converted[1].ptr_eq(&values[2]));

        let error = graph.convert_strictly(&values[1], to).unwrap_err();
        assert_eq!(error.to, to);
        assert_eq!(graph.convert_unsafe(&values[0], to).unwrap().downcast_ref::<u8>(), Some(&1));
        assert!(graph.convert_to_any(&Value::new(true), &[to]).is_none());
    }
}
