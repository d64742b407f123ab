//! Orden de eliminación por dependencias (claves foráneas).
//!
//! Un recurso se elimina sólo después de todos los recursos del conjunto que
//! dependen de él (hijos antes que padres). Si el grafo no se puede construir
//! (ciclo, dependencia irresoluble, conector sin información) se conserva el
//! orden recibido y se registra un warning: el orden es una optimización de
//! mejor esfuerzo, nunca un error.

use std::collections::{BTreeSet, HashMap};

use log::warn;

use crate::resource::ResourceRef;

#[derive(Debug, Clone)]
pub struct DropOrder {
    pub resources: Vec<ResourceRef>,
    /// Motivo por el que se usó el orden recibido.
    pub fallback: Option<String>,
}

impl DropOrder {
    pub fn is_fallback(&self) -> bool { self.fallback.is_some() }

    pub fn uris(&self) -> Vec<String> { self.resources.iter().map(|r| r.uri()).collect() }
}

/// Ordena `resources` para una eliminación segura. Los duplicados se
/// conservan una sola vez.
pub fn drop_order(resources: &[ResourceRef]) -> DropOrder {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ResourceRef> = Vec::with_capacity(resources.len());
    for resource in resources {
        let uri = resource.uri();
        if !index.contains_key(&uri) {
            index.insert(uri, unique.len());
            unique.push(resource.clone());
        }
    }

    let mut depends_on: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    for (i, resource) in unique.iter().enumerate() {
        let dependencies = match resource.dependencies() {
            Ok(d) => d,
            Err(e) => return fallback(&unique, format!("the dependencies of `{}` are unknown: {e}", resource.uri())),
        };
        for dependency in dependencies {
            let uri = format!("{dependency}@{}", resource.connection_name());
            if uri == resource.uri() {
                continue;
            }
            match index.get(&uri) {
                Some(&j) => depends_on[i].push(j),
                None => {
                    let resolved = resource.connector().resolve(&dependency).and_then(|d| d.exists());
                    if !matches!(resolved, Ok(true)) {
                        return fallback(&unique,
                                        format!("`{}` depends on `{uri}` which cannot be resolved", resource.uri()));
                    }
                }
            }
        }
    }

    match children_first(&depends_on) {
        Ok(order) => DropOrder { resources: order.into_iter().map(|i| unique[i].clone()).collect(),
                                 fallback: None },
        Err(cycle) => {
            let names: Vec<String> = cycle.iter().map(|&i| unique[i].uri()).collect();
            fallback(&unique, format!("cyclic dependency between {}", names.join(", ")))
        }
    }
}

fn fallback(resources: &[ResourceRef], reason: String) -> DropOrder {
    warn!("drop order falls back to the given order: {reason}");
    DropOrder { resources: resources.to_vec(),
                fallback: Some(reason) }
}

/// Orden topológico hijos-primero. `depends_on[i]` son los índices de los que
/// depende `i`. Entre nodos listos gana el menor índice, así el resultado se
/// parece lo más posible al orden de entrada. `Err` lleva los nodos que
/// quedaron en un ciclo.
pub(crate) fn children_first(depends_on: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = depends_on.len();
    let parents: Vec<BTreeSet<usize>> = depends_on.iter().map(|d| d.iter().copied().collect()).collect();
    let mut dependents = vec![0usize; n];
    for edges in &parents {
        for &parent in edges {
            dependents[parent] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| dependents[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &parent in &parents[i] {
            dependents[parent] -= 1;
            if dependents[parent] == 0 {
                ready.insert(parent);
            }
        }
    }
    if order.len() < n {
        let done: BTreeSet<usize> = order.into_iter().collect();
        return Err((0..n).filter(|i| !done.contains(i)).collect());
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn position(order: &[usize], node: usize) -> usize { order.iter().position(|&n| n == node).unwrap_or(usize::MAX) }

    #[test]
    fn chain_is_reversed() {
        // 0 <- 1 <- 2 (2 depende de 1, 1 depende de 0)
        assert_eq!(children_first(&[vec![], vec![0], vec![1]]), Ok(vec![2, 1, 0]));
    }

    #[test]
    fn independent_nodes_keep_input_order() {
        assert_eq!(children_first(&[vec![], vec![], vec![]]), Ok(vec![0, 1, 2]));
    }

    #[test]
    fn cycle_reports_members() {
        assert_eq!(children_first(&[vec![1], vec![0], vec![]]), Err(vec![0, 1]));
    }

    proptest! {
        #[test]
        fn dependents_always_come_first(edges in proptest::collection::vec(proptest::collection::vec(0usize..32, 0..4), 1..32)) {
            // sólo dependencias hacia índices menores: el grafo es acíclico
            let graph: Vec<Vec<usize>> = edges.iter()
                                              .enumerate()
                                              .map(|(i, deps)| deps.iter().copied().filter(|&d| d < i).collect())
                                              .collect();
            let order = children_first(&graph).expect("acyclic");
            prop_assert_eq!(order.len(), graph.len());
            for (child, parents) in graph.iter().enumerate() {
                for &parent in parents {
                    prop_assert!(position(&order, child) < position(&order, parent));
                }
            }
        }

        #[test]
        fn any_graph_yields_permutation_or_cycle(edges in proptest::collection::vec(proptest::collection::vec(0usize..16, 0..3), 1..16)) {
            let n = edges.len();
            let graph: Vec<Vec<usize>> = edges.iter().map(|deps| deps.iter().map(|&d| d % n).collect()).collect();
            match children_first(&graph) {
                Ok(order) => {
                    let mut sorted = order.clone();
                    sorted.sort_unstable();
                    prop_assert_eq!(sorted, (0..n).collect::<Vec<_>>());
                }
                Err(cycle) => prop_assert!(!cycle.is_empty()),
            }
        }
    }
}
