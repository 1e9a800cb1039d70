//! Integration tests for knowledge matching
//!
//! Tests verify that:
//! - Any/All match modes behave on multi-keyword tags
//! - Disabled, unmatchable and exclusive entries never reach the prompt
//! - The budget and confidence margin decide the cut
//! - Matching is idempotent

use recollect::config::KnowledgeConfig;
use recollect::knowledge::{
    KnowledgeBase, KnowledgeEntry, MatchMode, ScoredKnowledge, selected_entries,
};
use recollect::scoring::SelectionOutcome;
use recollect::testing::agent;

fn config() -> KnowledgeConfig {
    KnowledgeConfig::default()
}

fn selected_contents(candidates: &[ScoredKnowledge]) -> Vec<String> {
    selected_entries(candidates)
        .iter()
        .map(|c| c.entry.content.clone())
        .collect()
}

#[test]
fn test_all_mode_needs_every_keyword() {
    let mut kb = KnowledgeBase::new();
    kb.add(KnowledgeEntry::new("fire,raid", "Raiders set fires").with_match_mode(MatchMode::All));

    let fire_only = kb.match_keywords("There is a fire in the barn", None, None, &config(), 5);
    assert!(fire_only.is_empty());

    let both = kb.match_keywords("The raid started a fire", None, None, &config(), 5);
    assert_eq!(selected_contents(&both), vec!["Raiders set fires"]);
}

#[test]
fn test_any_mode_accepts_alternate_separators() {
    let mut kb = KnowledgeBase::new();
    kb.add(KnowledgeEntry::new("wolf，bear|boar", "Predators roam at night"));
    kb.add(KnowledgeEntry::new("trade / caravan", "Caravans arrive in spring"));

    let result = kb.match_keywords("a bear was seen", None, None, &config(), 5);
    assert_eq!(selected_contents(&result), vec!["Predators roam at night"]);

    let result = kb.match_keywords("The caravan is late", None, None, &config(), 5);
    assert_eq!(selected_contents(&result), vec!["Caravans arrive in spring"]);
}

#[test]
fn test_filtered_entries_are_reported_but_never_selected() {
    let alice = agent("alice");
    let bob = agent("bob");
    let carol = agent("carol");

    let mut kb = KnowledgeBase::new();
    kb.add(KnowledgeEntry::new("secret", "Disabled fact").disabled());
    kb.add(KnowledgeEntry::new("secret", "Hidden fact").unmatchable());
    kb.add(KnowledgeEntry::new("secret", "Alice's secret").exclusive_to(alice.clone()));
    kb.add(KnowledgeEntry::new("secret", "Shared secret"));

    let between_bob_and_carol =
        kb.match_keywords("tell me a secret", Some(&bob), Some(&carol), &config(), 5);
    assert_eq!(selected_contents(&between_bob_and_carol), vec!["Shared secret"]);
    let excluded = between_bob_and_carol
        .iter()
        .filter(|c| c.outcome == SelectionOutcome::ExcludedByFilter)
        .count();
    assert_eq!(excluded, 3);

    let alice_listening =
        kb.match_keywords("tell me a secret", Some(&bob), Some(&alice), &config(), 5);
    let mut contents = selected_contents(&alice_listening);
    contents.sort();
    assert_eq!(contents, vec!["Alice's secret", "Shared secret"]);
}

#[test]
fn test_budget_cut_applies_confidence_margin() {
    let mut kb = KnowledgeBase::new();
    kb.add(KnowledgeEntry::new("storm", "a").with_importance(0.9));
    kb.add(KnowledgeEntry::new("storm", "b").with_importance(0.5));
    kb.add(KnowledgeEntry::new("storm", "c").with_importance(0.48));

    let config = KnowledgeConfig {
        confidence_margin: 0.05,
        ..KnowledgeConfig::default()
    };
    let result = kb.match_keywords("storm coming", None, None, &config, 2);

    // "b" is too close to the cut "c" to be a confident pick
    assert_eq!(selected_contents(&result), vec!["a"]);
    let outcomes: Vec<SelectionOutcome> = result.iter().map(|c| c.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            SelectionOutcome::Selected,
            SelectionOutcome::ConfidenceMarginRejected,
            SelectionOutcome::ExceededBudget,
        ]
    );
}

#[test]
fn test_low_scores_fall_below_threshold() {
    let mut kb = KnowledgeBase::new();
    kb.add(KnowledgeEntry::new("dust", "Dust storms").with_importance(0.0));

    let config = KnowledgeConfig {
        keyword_match_bonus: 0.05,
        knowledge_score_threshold: 0.1,
        ..KnowledgeConfig::default()
    };
    let result = kb.match_keywords("dust everywhere", None, None, &config, 3);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].outcome, SelectionOutcome::LowScore);
    assert!(selected_entries(&result).is_empty());
}

#[test]
fn test_matching_is_idempotent() {
    let mut kb = KnowledgeBase::new();
    for i in 0..12 {
        kb.add(
            KnowledgeEntry::new("harvest", format!("fact {i}"))
                .with_importance((i % 4) as f32 / 4.0),
        );
    }

    let first = kb.match_keywords("the harvest festival", None, None, &config(), 4);
    let second = kb.match_keywords("the harvest festival", None, None, &config(), 4);

    let ids = |c: &[ScoredKnowledge]| c.iter().map(|k| (k.id(), k.outcome)).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_crud_round_trip() {
    let mut kb = KnowledgeBase::new();
    let id = kb.add(KnowledgeEntry::new("well", "The well is dry"));

    kb.edit(id, Some("well,water".to_string()), None).unwrap();
    let entry = kb.get(id).unwrap();
    assert!(entry.is_user_edited);
    assert_eq!(entry.keywords(), vec!["well", "water"]);

    kb.set_enabled(id, false).unwrap();
    assert!(kb.match_keywords("water please", None, None, &config(), 3)
        .iter()
        .all(|c| !c.is_selected()));

    kb.remove(id).unwrap();
    assert!(kb.is_empty());
    assert!(kb.remove(id).is_err());
}
