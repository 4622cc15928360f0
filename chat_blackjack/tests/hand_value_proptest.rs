//! Property-based tests for Blackjack hand values.

use chat_blackjack::game::cards::{BLACKJACK, Card, Hand, Rank, Suit, draw_card, hand_value};
use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

fn card_strategy() -> impl Strategy<Value = Card> {
    (0..Rank::ALL.len(), 0..Suit::ALL.len())
        .prop_map(|(rank, suit)| Card::new(Rank::ALL[rank], Suit::ALL[suit]))
}

fn hand_strategy(max: usize) -> impl Strategy<Value = Vec<Card>> {
    prop::collection::vec(card_strategy(), 0..=max)
}

/// Every value reachable by counting some of the aces low.
fn candidate_values(cards: &[Card]) -> Vec<u32> {
    let hard: u32 = cards.iter().map(|c| c.weight).sum();
    let aces = cards.iter().filter(|c| c.is_ace()).count() as u32;
    (0..=aces).map(|low| hard - 10 * low).collect()
}

proptest! {
    #[test]
    fn value_is_best_total_not_over_21(cards in hand_strategy(12)) {
        let value = hand_value(&cards);
        let candidates = candidate_values(&cards);
        let best = candidates.iter().copied().filter(|v| *v <= BLACKJACK).max();

        match best {
            Some(best) => prop_assert_eq!(value, best),
            None => prop_assert_eq!(value, *candidates.iter().min().unwrap()),
        }
    }

    #[test]
    fn hands_without_aces_sum_their_weights(cards in hand_strategy(8)) {
        let cards: Vec<Card> = cards.into_iter().filter(|c| !c.is_ace()).collect();
        let sum: u32 = cards.iter().map(|c| c.weight).sum();
        prop_assert_eq!(hand_value(&cards), sum);
    }

    #[test]
    fn adding_a_card_never_lowers_a_hand_below_its_hard_minimum(
        cards in hand_strategy(8),
        extra in card_strategy(),
    ) {
        let before = candidate_values(&cards).into_iter().min().unwrap_or(0);
        let mut more = cards.clone();
        more.push(extra);
        prop_assert!(hand_value(&more) > before);
    }

    #[test]
    fn hand_json_preserves_order_and_value(cards in hand_strategy(10)) {
        let hand: Hand = cards.iter().copied().collect();
        let json = serde_json::to_string(&hand).unwrap();
        let decoded: Hand = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(decoded.cards(), cards.as_slice());
        prop_assert_eq!(decoded.value(), hand.value());
    }

    #[test]
    fn drawn_cards_have_rank_weight(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            let card = draw_card(&mut rng);
            prop_assert_eq!(card.weight, card.rank.weight());
        }
    }
}

#[test]
fn test_reference_hands() {
    let hand = |ranks: &[Rank]| -> Vec<Card> {
        ranks.iter().map(|r| Card::new(*r, Suit::Spades)).collect()
    };

    assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::Ace, Rank::Nine])), 21);
    assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::King])), 21);
    assert_eq!(hand_value(&hand(&[Rank::King, Rank::Queen, Rank::Five])), 25);
}
