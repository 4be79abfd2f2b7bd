//! User mobility models.
//!
//! A mobility model is an infinite lazy sequence of user counts: each call to
//! [`UserMobilityModel::next`] advances the model by one interval and returns
//! the number of users currently served by the fog infrastructure.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Source of per-interval active user counts.
///
/// Deterministic given its seed; there is no reset, a fresh sequence is
/// obtained by reconstructing the model.
pub trait UserMobilityModel {
    fn next(&mut self) -> usize;
}

/// Always returns the same number of users.
pub struct FixedUserMobilityModel {
    num_users: usize,
}

impl FixedUserMobilityModel {
    pub fn new(num_users: usize) -> Self {
        Self { num_users }
    }
}

impl UserMobilityModel for FixedUserMobilityModel {
    fn next(&mut self) -> usize {
        self.num_users
    }
}

/// Cycles through a fixed sequence of user counts.
///
/// The k-th call returns `seq[k mod seq.len()]`, generating a periodic step
/// function.
pub struct StepUserMobilityModel {
    num_users_seq: Vec<usize>,
    next_idx: usize,
}

impl StepUserMobilityModel {
    pub fn new(num_users_seq: Vec<usize>) -> Self {
        assert!(!num_users_seq.is_empty(), "empty step sequence");
        Self {
            num_users_seq,
            next_idx: 0,
        }
    }
}

impl UserMobilityModel for StepUserMobilityModel {
    fn next(&mut self) -> usize {
        let n = self.num_users_seq[self.next_idx];
        self.next_idx = (self.next_idx + 1) % self.num_users_seq.len();
        n
    }
}

struct Node {
    x: f64,
    y: f64,
    waypoint_x: f64,
    waypoint_y: f64,
    speed: f64,
    pause_left: f64,
}

/// Classical random-waypoint mobility over a rectangular area.
///
/// Each node repeatedly picks a uniform waypoint in
/// `[0, max_x] x [0, max_y]` and a uniform speed in `[min_v, max_v]`, moves
/// toward the waypoint, and on arrival pauses for a uniform time in
/// `[0, max_wt]`. Every call to `next` advances all nodes by one unit of time
/// and returns the count of nodes inside the coverage disc centred in the
/// area with radius `min(max_x, max_y) / 4`.
///
/// References:
/// - Mao, Shiwen (2010). "Fundamentals of Communication Networks".
///   Cognitive Radio Communications and Networks, pp. 201-234.
pub struct RandomWaypointUserMobilityModel {
    nodes: Vec<Node>,
    max_x: f64,
    max_y: f64,
    min_v: f64,
    max_v: f64,
    max_wt: f64,
    rng: Pcg64,
}

impl RandomWaypointUserMobilityModel {
    pub const DEFAULT_MIN_V: f64 = 10.;
    pub const DEFAULT_MAX_V: f64 = 100.;
    pub const DEFAULT_MAX_WT: f64 = 0.;
    pub const DEFAULT_SEED: u64 = 0xffff;

    pub fn new(
        nr_nodes: usize,
        max_x: f64,
        max_y: f64,
        min_v: f64,
        max_v: f64,
        max_wt: f64,
        seed: u64,
    ) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut nodes = Vec::with_capacity(nr_nodes);
        for _ in 0..nr_nodes {
            let x = rng.gen_range(0.0..max_x);
            let y = rng.gen_range(0.0..max_y);
            let waypoint_x = rng.gen_range(0.0..max_x);
            let waypoint_y = rng.gen_range(0.0..max_y);
            let speed = if max_v > min_v {
                rng.gen_range(min_v..max_v)
            } else {
                min_v
            };
            nodes.push(Node {
                x,
                y,
                waypoint_x,
                waypoint_y,
                speed,
                pause_left: 0.,
            });
        }
        Self {
            nodes,
            max_x,
            max_y,
            min_v,
            max_v,
            max_wt,
            rng,
        }
    }

    fn advance_node(node: &mut Node, mut dt: f64, area: (f64, f64), speeds: (f64, f64), max_wt: f64, rng: &mut Pcg64) {
        while dt > 0. {
            if node.pause_left > 0. {
                let pause = node.pause_left.min(dt);
                node.pause_left -= pause;
                dt -= pause;
                continue;
            }
            let dx = node.waypoint_x - node.x;
            let dy = node.waypoint_y - node.y;
            let dist = (dx * dx + dy * dy).sqrt();
            let reach = node.speed * dt;
            if reach < dist {
                node.x += dx / dist * reach;
                node.y += dy / dist * reach;
                return;
            }
            // Waypoint reached: pause, then pick a new destination and speed.
            node.x = node.waypoint_x;
            node.y = node.waypoint_y;
            dt -= if node.speed > 0. { dist / node.speed } else { dt };
            node.pause_left = if max_wt > 0. { rng.gen_range(0.0..max_wt) } else { 0. };
            node.waypoint_x = rng.gen_range(0.0..area.0);
            node.waypoint_y = rng.gen_range(0.0..area.1);
            node.speed = if speeds.1 > speeds.0 {
                rng.gen_range(speeds.0..speeds.1)
            } else {
                speeds.0
            };
        }
    }

    fn covered(&self, node: &Node) -> bool {
        let cx = self.max_x * 0.5;
        let cy = self.max_y * 0.5;
        let radius = self.max_x.min(self.max_y) * 0.25;
        let dx = node.x - cx;
        let dy = node.y - cy;
        dx * dx + dy * dy <= radius * radius
    }
}

impl UserMobilityModel for RandomWaypointUserMobilityModel {
    fn next(&mut self) -> usize {
        let area = (self.max_x, self.max_y);
        let speeds = (self.min_v, self.max_v);
        for node in self.nodes.iter_mut() {
            Self::advance_node(node, 1., area, speeds, self.max_wt, &mut self.rng);
        }
        self.nodes.iter().filter(|node| self.covered(node)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() {
        let mut model = FixedUserMobilityModel::new(5);
        for _ in 0..10 {
            assert_eq!(model.next(), 5);
        }
    }

    #[test]
    fn test_step_wraps_around() {
        let mut model = StepUserMobilityModel::new(vec![2, 6, 4]);
        let seq: Vec<_> = (0..7).map(|_| model.next()).collect();
        assert_eq!(seq, vec![2, 6, 4, 2, 6, 4, 2]);
    }

    #[test]
    fn test_random_waypoint_deterministic_given_seed() {
        let mut a = RandomWaypointUserMobilityModel::new(50, 100., 100., 10., 100., 0., 42);
        let mut b = RandomWaypointUserMobilityModel::new(50, 100., 100., 10., 100., 0., 42);
        for _ in 0..20 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_random_waypoint_count_bounded_by_nodes() {
        let mut model = RandomWaypointUserMobilityModel::new(30, 200., 100., 10., 50., 2., 7);
        for _ in 0..50 {
            assert!(model.next() <= 30);
        }
    }
}
