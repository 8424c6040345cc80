//! Reference scenarios for a weekly Data Farming round
//!
//! Literal inputs with hand-computed expected rewards, covering each of the
//! three reward bounds, multiple basetokens and the publisher boost.

use df_core::{
    Address, LockedAmounts, NftVols, Owners, PredictoorFeeds, Rates, Stakes, Symbol, Symbols,
};
use df_economics::calendar::parse_date;
use df_economics::{
    calc_challenge_rewards, rank_based_allocate, RankScaleOp, RewardCalculator, RewardInputs,
    RewardParams,
};

const CHAIN: u64 = 1;

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn lp1() -> Address {
    addr("0x1000000000000000000000000000000000000001")
}

fn lp2() -> Address {
    addr("0x1000000000000000000000000000000000000002")
}

fn nft_a() -> Address {
    addr("0xa000000000000000000000000000000000000001")
}

fn nft_b() -> Address {
    addr("0xb000000000000000000000000000000000000001")
}

fn ocean_addr() -> Address {
    addr("0x967da4048cd07ab37855c090aaf366e4ce1b9f48")
}

fn h2o_addr() -> Address {
    addr("0x0642026e7f0b6ccac5925b4e7fa61384250e1701")
}

/// Owned inputs for one round on a single chain
struct Round {
    stakes: Stakes,
    locked: LockedAmounts,
    nftvols: NftVols,
    owners: Owners,
    symbols: Symbols,
    rates: Rates,
    feeds: PredictoorFeeds,
}

impl Round {
    fn new(ocean_rate: f64) -> Self {
        let mut symbols = Symbols::new();
        let chain = symbols.entry(CHAIN).or_default();
        chain.insert(ocean_addr(), Symbol::ocean());
        chain.insert(h2o_addr(), Symbol::h2o());

        let mut rates = Rates::new();
        rates.insert(Symbol::ocean(), ocean_rate);
        rates.insert(Symbol::h2o(), 1.6);

        Self {
            stakes: Stakes::new(),
            locked: LockedAmounts::new(),
            nftvols: NftVols::new(),
            owners: Owners::new(),
            symbols,
            rates,
            feeds: PredictoorFeeds::new(),
        }
    }

    fn stake(mut self, nft: Address, lp: Address, stake: f64, locked: f64) -> Self {
        self.stakes
            .entry(CHAIN)
            .or_default()
            .entry(nft.clone())
            .or_default()
            .insert(lp.clone(), stake);
        self.locked
            .entry(CHAIN)
            .or_default()
            .entry(nft)
            .or_default()
            .insert(lp, locked);
        self
    }

    fn volume(mut self, basetoken: Address, nft: Address, vol: f64) -> Self {
        self.nftvols
            .entry(CHAIN)
            .or_default()
            .entry(basetoken)
            .or_default()
            .insert(nft, vol);
        self
    }

    fn owner(mut self, nft: Address, owner: Address) -> Self {
        self.owners.entry(CHAIN).or_default().insert(nft, owner);
        self
    }

    fn inputs(&self, week: i64, ocean_avail: f64) -> RewardInputs<'_> {
        RewardInputs {
            stakes: &self.stakes,
            locked: &self.locked,
            nftvols: &self.nftvols,
            owners: &self.owners,
            symbols: &self.symbols,
            rates: &self.rates,
            predictoor_feeds: &self.feeds,
            week,
            ocean_avail,
        }
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_simple_round_pays_whole_budget() {
    let round = Round::new(0.5)
        .stake(nft_a(), lp1(), 1000.0, 1000.0)
        .volume(ocean_addr(), nft_a(), 1.0);

    let result = RewardCalculator::default().calculate(&round.inputs(7, 10.0)).unwrap();

    assert_eq!(result.rewards.len(), 1);
    assert!(approx(result.rewards[&CHAIN][&lp1()], 10.0));
}

#[test]
fn test_two_basetokens_split_evenly() {
    let round = Round::new(0.5)
        .stake(nft_a(), lp1(), 5000.0, 5000.0)
        .stake(nft_b(), lp1(), 5000.0, 5000.0)
        .volume(ocean_addr(), nft_a(), 40.0)
        .volume(h2o_addr(), nft_b(), 12.5);

    let result = RewardCalculator::default().calculate(&round.inputs(7, 10.0)).unwrap();

    assert!(approx(result.rewards[&CHAIN][&lp1()], 10.0));
    assert!(approx(result.rewards_info[&CHAIN][&nft_a()][&lp1()], 5.0));
    assert!(approx(result.rewards_info[&CHAIN][&nft_b()][&lp1()], 5.0));
}

#[test]
fn test_apy_bound_caps_thin_stake() {
    let round = Round::new(0.5)
        .stake(nft_a(), lp1(), 1.0, 1.0)
        .volume(ocean_addr(), nft_a(), 1.0);

    let result = RewardCalculator::default().calculate(&round.inputs(7, 10_000.0)).unwrap();

    assert!(approx(result.rewards[&CHAIN][&lp1()], 0.015717));
}

#[test]
fn test_dcv_bound_at_week_9() {
    let round = Round::new(1.0)
        .stake(nft_a(), lp1(), 1e6, 1e6)
        .volume(ocean_addr(), nft_a(), 100.0);

    let result = RewardCalculator::default().calculate(&round.inputs(9, 10_000.0)).unwrap();

    assert!(approx(result.rewards[&CHAIN][&lp1()], 100.0));
}

#[test]
fn test_publisher_boost_doubles_owner_stake() {
    let round = Round::new(0.5)
        .stake(nft_a(), lp1(), 50_000.0, 50_000.0)
        .stake(nft_a(), lp2(), 100_000.0, 100_000.0)
        .volume(ocean_addr(), nft_a(), 1.0)
        .owner(nft_a(), lp1());

    let result = RewardCalculator::default().calculate(&round.inputs(7, 10.0)).unwrap();
    assert!(approx(result.rewards[&CHAIN][&lp1()], 5.0));
    assert!(approx(result.rewards[&CHAIN][&lp2()], 5.0));

    let no_boost = RewardCalculator::new(RewardParams {
        do_pubrewards: false,
        ..Default::default()
    });
    let result = no_boost.calculate(&round.inputs(7, 10.0)).unwrap();
    assert!(approx(result.rewards[&CHAIN][&lp1()], 10.0 / 3.0));
    assert!(approx(result.rewards[&CHAIN][&lp2()], 20.0 / 3.0));
}

#[test]
fn test_rank_allocation_log_scale() {
    let perc = rank_based_allocate(&[10.0, 99.0, 3.0], 100, RankScaleOp::Log).unwrap();

    let expected = [0.298, 0.553, 0.149];
    for (got, want) in perc.iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "{got} vs {want}");
    }
    assert!((perc.iter().sum::<f64>() - 1.0).abs() < 1e-8);
}

#[test]
fn test_challenge_before_first_date_pays_zero() {
    let winners = vec![lp1(), lp2(), nft_a()];
    let rewards = calc_challenge_rewards(&winners, parse_date("2023-04-27").unwrap(), 0.4).unwrap();

    assert_eq!(rewards.len(), 3);
    for (reward, winner) in rewards.iter().zip(&winners) {
        assert_eq!(&reward.winner_addr, winner);
        assert_eq!(reward.ocean_amt, 0.0);
    }
}
