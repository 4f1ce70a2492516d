//! Strategy selection: which provider claims a pair.
//!
//! Two tiers. User-registered strategies are consulted first and, when any
//! of them claims the pair, win outright; the built-in tier is only
//! consulted when no user strategy claims. Within a tier the highest score
//! wins and ties go to the earliest registration. An unclaimed pair either
//! falls through to the best-effort coercion fallback or, when explicit
//! mappings are required, fails compilation.

use std::sync::Arc;

use crate::pair::TypePair;
use crate::strategies::{self, CoerceStrategy, ConversionStrategy};
use crate::synth::SynthEnv;

pub(crate) struct StrategyRegistry {
    user: Vec<Arc<dyn ConversionStrategy>>,
    builtin: Vec<Arc<dyn ConversionStrategy>>,
    fallback: CoerceStrategy,
}

impl StrategyRegistry {
    pub fn new(user: Vec<Arc<dyn ConversionStrategy>>) -> StrategyRegistry {
        StrategyRegistry { user, builtin: strategies::builtins(), fallback: CoerceStrategy }
    }

    /// The strategy claiming a pair, if any.
    pub fn select(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<&dyn ConversionStrategy> {
        Self::best(&self.user, pair, env).or_else(|| Self::best(&self.builtin, pair, env))
    }

    fn best<'s>(
        tier: &'s [Arc<dyn ConversionStrategy>],
        pair: TypePair,
        env: &SynthEnv<'_>,
    ) -> Option<&'s dyn ConversionStrategy> {
        let mut best: Option<(i32, &'s dyn ConversionStrategy)> = None;
        for strategy in tier {
            if let Some(score) = strategy.score(pair, env) {
                match best {
                    Some((top, _)) if score <= top => {}
                    _ => best = Some((score, strategy.as_ref())),
                }
            }
        }
        best.map(|(_, strategy)| strategy)
    }

    /// The best-effort fallback for pairs nothing claims.
    pub fn fallback(&self) -> &dyn ConversionStrategy {
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::pair::MappingKind;
    use crate::plan::Plan;
    use crate::settings::MapperConfig;
    use crate::synth::Synthesizer;
    use morph_model::{ShapeId, ShapeRegistry};

    struct Fixed(&'static str, Option<i32>);

    impl ConversionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn score(&self, _pair: TypePair, _env: &SynthEnv<'_>) -> Option<i32> {
            self.1
        }

        fn synthesize(
            &self,
            pair: TypePair,
            syn: &mut Synthesizer<'_>,
        ) -> Result<Plan, CompileError> {
            Ok(syn.custom(pair, |v| Ok(v.clone())))
        }
    }

    fn env_fixture() -> (ShapeRegistry, MapperConfig) {
        (ShapeRegistry::new(), MapperConfig::new())
    }

    #[test]
    fn user_tier_beats_builtins_regardless_of_score() {
        let (shapes, config) = env_fixture();
        let env = SynthEnv { shapes: &shapes, config: &config };
        let registry = StrategyRegistry::new(vec![Arc::new(Fixed("user", Some(-5)))]);

        // A pair the scalar builtin would otherwise claim at a far higher
        // score.
        let pair = TypePair::new(ShapeId::I32, ShapeId::I64, MappingKind::NewInstance);
        assert_eq!(registry.select(pair, &env).unwrap().name(), "user");
    }

    #[test]
    fn ties_go_to_the_first_registration() {
        let (shapes, config) = env_fixture();
        let env = SynthEnv { shapes: &shapes, config: &config };
        let registry = StrategyRegistry::new(vec![
            Arc::new(Fixed("first", Some(7))),
            Arc::new(Fixed("second", Some(7))),
            Arc::new(Fixed("third", Some(9))),
        ]);

        let pair = TypePair::new(ShapeId::I32, ShapeId::I64, MappingKind::NewInstance);
        assert_eq!(registry.select(pair, &env).unwrap().name(), "third");

        let registry = StrategyRegistry::new(vec![
            Arc::new(Fixed("first", Some(7))),
            Arc::new(Fixed("second", Some(7))),
        ]);
        assert_eq!(registry.select(pair, &env).unwrap().name(), "first");
    }

    #[test]
    fn unclaimed_pairs_select_nothing() {
        let (mut shapes, config) = env_fixture();
        let list = shapes.list_of(ShapeId::I32);
        let env = SynthEnv { shapes: &shapes, config: &config };
        let registry = StrategyRegistry::new(Vec::new());

        // No builtin converts a scalar into a list.
        let pair = TypePair::new(ShapeId::BOOL, list, MappingKind::NewInstance);
        assert!(registry.select(pair, &env).is_none());
    }
}
