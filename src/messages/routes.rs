//! Declarative navigation route table for the transport vehicle
//!
//! Each route lists its nodes in traversal order (module serials at the
//! ends, numbered crossings in between) and the physical length of each
//! segment in millimeters. The generator turns a route into a VDA 5050
//! node/edge graph; the terminal node is always the docking target.

/// Delivery/pickup station serial
pub const DPS_SERIAL: &str = "SVR4H73275";

/// High-bay warehouse serial
pub const HBW_SERIAL: &str = "SVR3QA0022";

/// Mill station serial
pub const MILL_SERIAL: &str = "SVR3QA2098";

/// Drill station serial
pub const DRILL_SERIAL: &str = "SVR4H76449";

/// AI quality inspection station serial
pub const AIQS_SERIAL: &str = "SVR4H76530";

/// A declared navigation route
#[derive(Debug, Clone, Copy)]
pub struct Route {
    /// Symbolic route name callers use
    pub name: &'static str,

    /// Node ids in traversal order; at least two
    pub nodes: &'static [&'static str],

    /// Segment lengths in millimeters; `len == nodes.len() - 1`
    pub lengths: &'static [u32],
}

/// One traversal segment of a route
#[derive(Debug, Clone, Copy)]
pub struct RouteSegment {
    /// Origin node id
    pub from: &'static str,

    /// Destination node id
    pub to: &'static str,

    /// Physical length in millimeters
    pub length: u32,
}

impl Route {
    /// The docking target, i.e. the last node
    #[must_use]
    pub fn terminal(&self) -> &'static str {
        self.nodes[self.nodes.len() - 1]
    }

    /// Consecutive segments in traversal order
    #[must_use]
    pub fn segments(&self) -> Vec<RouteSegment> {
        self.nodes
            .windows(2)
            .zip(self.lengths)
            .map(|(pair, &length)| RouteSegment {
                from: pair[0],
                to: pair[1],
                length,
            })
            .collect()
    }
}

/// Factory floor routes; crossings are the numbered intersection nodes
const ROUTES: &[Route] = &[
    Route {
        name: "DPS_HBW",
        nodes: &[DPS_SERIAL, "2", "1", HBW_SERIAL],
        lengths: &[380, 360, 380],
    },
    Route {
        name: "HBW_DPS",
        nodes: &[HBW_SERIAL, "1", "2", DPS_SERIAL],
        lengths: &[380, 360, 380],
    },
    Route {
        name: "RED-Prod",
        nodes: &[DPS_SERIAL, "2", "3", MILL_SERIAL],
        lengths: &[380, 360, 320],
    },
    Route {
        name: "BLUE-Prod",
        nodes: &[DPS_SERIAL, "2", "4", DRILL_SERIAL],
        lengths: &[380, 360, 320],
    },
    Route {
        name: "WHITE-Prod",
        nodes: &[DPS_SERIAL, "2", AIQS_SERIAL],
        lengths: &[380, 340],
    },
];

/// Look up a route by its symbolic name
#[must_use]
pub fn route(name: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.name == name)
}

/// All declared route names, declaration order
#[must_use]
pub fn route_names() -> Vec<&'static str> {
    ROUTES.iter().map(|r| r.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_well_formed() {
        for r in ROUTES {
            assert!(r.nodes.len() >= 2, "{} too short", r.name);
            assert_eq!(
                r.lengths.len(),
                r.nodes.len() - 1,
                "{} lengths mismatch",
                r.name
            );
            assert_eq!(r.segments().len(), r.nodes.len() - 1);
        }
    }

    #[test]
    fn dps_hbw_route_shape() {
        let r = route("DPS_HBW").unwrap();
        assert_eq!(r.nodes[0], DPS_SERIAL);
        assert_eq!(r.terminal(), HBW_SERIAL);
        assert_eq!(r.lengths[0], 380);
    }

    #[test]
    fn unknown_route_is_none() {
        assert!(route("HBW_MOON").is_none());
    }
}
