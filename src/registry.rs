//! Agent registry: deterministic role assignment, employer binding, lookups.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::RegistryError;
use crate::models::{Agent, Role, WealthTraits};
use crate::rng::Rng;

/// Owns the full set of agents. The sole writer to agent state; all
/// mutation flows through [`Registry::update_agent`].
#[derive(Debug, Clone)]
pub struct Registry {
    agents: BTreeMap<String, Agent>,
    by_role: BTreeMap<Role, Vec<String>>,
    tape_to_id: BTreeMap<u64, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Constructs an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            by_role: BTreeMap::new(),
            tape_to_id: BTreeMap::new(),
        }
    }

    /// Assigns roles to a set of tape ids, in proportion to the configured
    /// ratios, using `rng`. Allocates ids in assignment order (`K-01`,
    /// `K-02`,..., `N-01`,..., `M-01`,...) and samples initial
    /// currency/wealth/role-specific fields from the configured ranges.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateTapeId`] if `tape_ids` contains a
    /// duplicate, or if a tape id was already bound in a prior call.
    pub fn assign_roles(
        &mut self,
        tape_ids: &[u64],
        cfg: &Config,
        rng: &mut Rng,
    ) -> Result<(), RegistryError> {
        let mut sorted: Vec<u64> = tape_ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != tape_ids.len() {
            // A duplicate was present in the input itself.
            let mut seen = std::collections::BTreeSet::new();
            for id in tape_ids {
                if !seen.insert(*id) {
                    return Err(RegistryError::DuplicateTapeId(*id));
                }
            }
        }
        for id in &sorted {
            if self.tape_to_id.contains_key(id) {
                return Err(RegistryError::DuplicateTapeId(*id));
            }
        }

        let n = sorted.len();
        let roles = draw_roles(n, cfg, rng);

        let mut counters: BTreeMap<Role, u32> = BTreeMap::new();
        for (tape_id, role) in sorted.into_iter().zip(roles) {
            let counter = counters.entry(role).or_insert(0);
            *counter += 1;
            let id = format!("{}{:02}", role.id_prefix(), counter);

            let (currency_range, wealth_range) = match role {
                Role::King => (cfg.roles.initial_currency.king, cfg.roles.initial_wealth.king),
                Role::Knight => (
                    cfg.roles.initial_currency.knight,
                    cfg.roles.initial_wealth.knight,
                ),
                Role::Mercenary => (
                    cfg.roles.initial_currency.mercenary,
                    cfg.roles.initial_wealth.mercenary,
                ),
            };
            #[allow(clippy::cast_sign_loss)]
            let currency = rng.next_range_i64(currency_range.lo, currency_range.hi) as u64;
            let wealth = sample_wealth(wealth_range, rng);

            #[allow(clippy::expect_used)]
            let mut agent = Agent::new(id.clone(), tape_id, role, currency, wealth)
                .expect("constructed id always matches role prefix");

            match role {
                Role::Knight => {
                    #[allow(clippy::cast_sign_loss)]
                    let fee = rng.next_range_i64(
                        cfg.roles.retainer_fee_range.lo,
                        cfg.roles.retainer_fee_range.hi,
                    ) as u64;
                    agent.retainer_fee = fee;
                }
                Role::King => {
                    #[allow(clippy::cast_sign_loss)]
                    let threshold = rng.next_range_i64(
                        cfg.roles.bribe_threshold_range.lo,
                        cfg.roles.bribe_threshold_range.hi,
                    ) as u64;
                    agent.bribe_threshold = threshold;
                }
                Role::Mercenary => {}
            }

            self.by_role.entry(role).or_default().push(id.clone());
            self.tape_to_id.insert(tape_id, id.clone());
            self.agents.insert(id, agent);
        }

        for ids in self.by_role.values_mut() {
            ids.sort();
        }

        Ok(())
    }

    /// Pairs each Knight with a King in a deterministic round-robin over
    /// sorted King ids.
    pub fn assign_knight_employers(&mut self) {
        let kings = self.by_role.get(&Role::King).cloned().unwrap_or_default();
        if kings.is_empty() {
            return;
        }
        let knights = self.by_role.get(&Role::Knight).cloned().unwrap_or_default();
        for (i, knight_id) in knights.iter().enumerate() {
            let king_id = &kings[i % kings.len()];
            if let Some(knight) = self.agents.get_mut(knight_id) {
                knight.employer = Some(king_id.clone());
            }
        }
    }

    /// Looks up an agent by id.
    #[must_use]
    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Returns agent ids for a role, in sorted (deterministic) order.
    #[must_use]
    pub fn ids_by_role(&self, role: Role) -> &[String] {
        self.by_role.get(&role).map_or(&[], Vec::as_slice)
    }

    /// Returns agent references for a role, in sorted id order.
    #[must_use]
    pub fn agents_by_role(&self, role: Role) -> Vec<&Agent> {
        self.ids_by_role(role)
            .iter()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    /// Iterates all agents in sorted id order.
    pub fn all_agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Writes an agent back after mutation.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownAgent`] if `agent.id` is not present.
    pub fn update_agent(&mut self, agent: Agent) -> Result<(), RegistryError> {
        if !self.agents.contains_key(&agent.id) {
            return Err(RegistryError::UnknownAgent(agent.id));
        }
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// For each agent, with probability `cfg.roles.mutation_rate`, reassigns
    /// its role and resets role-specific fields (default disabled).
    /// Returns the ids that were mutated; callers decide whether to log an
    /// event, gated by `cfg.roles.mutation_events`.
    pub fn mutate_roles(&mut self, cfg: &Config, rng: &mut Rng) -> Vec<String> {
        if cfg.roles.mutation_rate <= 0.0 {
            return Vec::new();
        }
        let ids: Vec<String> = self.agents.keys().cloned().collect();
        let mut mutated = Vec::new();
        for id in ids {
            if !rng.next_bool_with_prob(cfg.roles.mutation_rate) {
                continue;
            }
            let new_role = match rng.next_range_i64(0, 2) {
                0 => Role::King,
                1 => Role::Knight,
                _ => Role::Mercenary,
            };
            if let Some(agent) = self.agents.get_mut(&id) {
                if agent.role == new_role {
                    continue;
                }
                agent.role = new_role;
                agent.employer = None;
                agent.retainer_fee = 0;
                agent.bribe_threshold = 0;
                mutated.push(id);
            }
        }
        for ids in self.by_role.values_mut() {
            ids.clear();
        }
        for agent in self.agents.values() {
            self.by_role.entry(agent.role).or_default().push(agent.id.clone());
        }
        for ids in self.by_role.values_mut() {
            ids.sort();
        }
        mutated
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry has no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn draw_roles(n: usize, cfg: &Config, rng: &mut Rng) -> Vec<Role> {
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let king_n = (cfg.roles.ratios.king * n as f64).round() as usize;
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let knight_n = (cfg.roles.ratios.knight * n as f64).round() as usize;
    let king_n = king_n.min(n);
    let knight_n = knight_n.min(n - king_n);
    let merc_n = n - king_n - knight_n;

    let mut pool = Vec::with_capacity(n);
    pool.extend(std::iter::repeat(Role::King).take(king_n));
    pool.extend(std::iter::repeat(Role::Knight).take(knight_n));
    pool.extend(std::iter::repeat(Role::Mercenary).take(merc_n));

    // Fisher-Yates shuffle the role pool itself (not the tape id order,
    // which the caller already sorted): assignment order over sorted
    // tape ids stays deterministic, while which tape gets which role is
    // governed by the seeded stream.
    for i in (1..pool.len()).rev() {
        #[allow(clippy::cast_sign_loss)]
        let j = rng.next_range_i64(0, i as i64) as usize;
        pool.swap(i, j);
    }
    pool
}

fn sample_wealth(range: crate::config::Range, rng: &mut Rng) -> WealthTraits {
    let mut values = [0i64; 7];
    for v in &mut values {
        *v = rng.next_range_i64(range.lo, range.hi);
    }
    #[allow(clippy::expect_used)]
    {
        WealthTraits::try_new(values).expect("sampled range is non-negative by config validation")
    }
}
