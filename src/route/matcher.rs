//! Route resolution for an inbound method and path.
//!
//! The inbound path is normalized with [`split_path`] and compared against
//! every route of the requested method that has the same number of segments.
//! When several routes accept the path, the one with the fewest captures wins,
//! so literal segments take precedence over captures at the same position.
//! Remaining ties go to the route registered first.
//!
//! Matching is pure: it never constructs handlers or runs operations.

use super::catalog::Route;
use super::template::split_path;

/// A resolved route with the raw text captured for each of its parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch<'c, 'p> {
    route: &'c Route,
    captured: Vec<&'p str>,
}

impl<'c, 'p> RouteMatch<'c, 'p> {
    pub fn route(&self) -> &'c Route {
        self.route
    }

    /// Captured segments, in the same order as [`Route::parameters`].
    pub fn captured(&self) -> &[&'p str] {
        &self.captured
    }

    /// Captures paired with the name of the parameter they bind to.
    pub fn named(&self) -> impl Iterator<Item = (&str, &'p str)> {
        self.route
            .parameters()
            .iter()
            .map(|p| p.name())
            .zip(self.captured.iter().copied())
    }
}

impl PartialEq for RouteMatch<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.route, other.route) && self.captured == other.captured
    }
}

/// Pick the best route in `routes` for `path`, or `None` when nothing matches.
pub fn resolve<'c, 'p>(routes: &'c [Route], path: &'p str) -> Option<RouteMatch<'c, 'p>> {
    let inbound = split_path(path);
    let mut best: Option<(usize, RouteMatch<'c, 'p>)> = None;

    for route in routes {
        let template = route.template();
        if template.len() != inbound.len() {
            continue;
        }
        let Some(captured) = template.captures(&inbound) else {
            continue;
        };

        let captures = template.parameter_count();
        let better = match &best {
            Some((fewest, _)) => captures < *fewest,
            None => true,
        };
        if better {
            best = Some((captures, RouteMatch { route, captured }));
        }
        if captures == 0 {
            break;
        }
    }

    best.map(|(_, matched)| matched)
}
