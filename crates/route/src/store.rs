use std::collections::HashMap;
use std::sync::Arc;

use crate::geometry::Route;

/// Loaded routes, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RouteStore {
    routes: HashMap<String, Arc<Route>>,
}

impl RouteStore {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut store = RouteStore::default();
        for route in routes {
            store.insert(route);
        }
        store
    }

    pub fn insert(&mut self, route: Route) {
        self.routes
            .insert(route.name().to_string(), Arc::new(route));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Route>> {
        self.routes.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
