use alloy_primitives::{Address, U256, address};
use criterion::{Criterion, criterion_group, criterion_main};
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;
use xchain_arb::data_sync::mock_provider::encode_reserves;
use xchain_arb::logic::math::optimal_amount_in;
use xchain_arb::{
    ChainProviders, DryRunExecutor, OpportunitySearch, Path, PathRegistry, Pool, ReserveStore, SearchConfig, Step, Token,
};

const NETWORK: u64 = 1;
const PATHS: usize = 2_000;

lazy_static! {
    static ref WETH: Token = Token::new(address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), NETWORK, "WETH", 18);
}

fn one_ether() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

/// `PATHS` two-hop WETH cycles, each through its own token with slightly mispriced pools.
fn build_store() -> eyre::Result<Arc<ReserveStore>> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut tokens = vec![WETH.clone()];
    let mut pools = Vec::new();
    let mut paths = Vec::new();
    let mut reserves = Vec::new();

    for i in 0..PATHS {
        let token = Address::random();
        tokens.push(Token::new(token, NETWORK, format!("TKN{i}"), 18));
        let buy = Pool::new(Address::random(), WETH.id, token, NETWORK, "UNISWAP");
        let sell = Pool::new(Address::random(), token, WETH.id, NETWORK, "SUSHI");

        let weth = U256::from(rng.gen_range(1_000u64..2_000)) * one_ether();
        let price = U256::from(rng.gen_range(1_900u64..2_100));
        reserves.push((buy.id, weth, weth * price));
        reserves.push((sell.id, weth * U256::from(2_000u64), weth));

        let desc = format!("WETH|TKN{i}::UNISWAP::{NETWORK} => TKN{i}|WETH::SUSHI::{NETWORK}");
        let step = Step::new(NETWORK, vec![buy.id, sell.id], vec![WETH.id, token, WETH.id]);
        paths.push(Path::new(Path::derive_id(&desc), desc, vec![step]));
        pools.push(buy);
        pools.push(sell);
    }

    let registry = PathRegistry::new(tokens, pools, paths)?;
    let store = ReserveStore::new(Arc::new(registry), ChainProviders::new());
    for (pool, reserve0, reserve1) in reserves {
        store.apply_raw_patch(&pool, &encode_reserves(reserve0, reserve1))?;
    }
    Ok(Arc::new(store))
}

fn benchmark_search(c: &mut Criterion) {
    let store = build_store().expect("bench store");
    let parallel = OpportunitySearch::new(SearchConfig::default(), store.clone(), Arc::new(DryRunExecutor::default()));
    let sequential = OpportunitySearch::new(
        SearchConfig { enable_parallel: false, ..SearchConfig::default() },
        store,
        Arc::new(DryRunExecutor::default()),
    );
    let paths = parallel.registry().paths().to_vec();
    let reserve_path = parallel.reserve_path_for(&paths[0]).expect("reserve path");

    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    group.bench_function("optimal_amount_in", |b| b.iter(|| optimal_amount_in(black_box(&reserve_path))));
    group.bench_function("rank_parallel", |b| b.iter(|| parallel.rank(black_box(&paths))));
    group.bench_function("rank_sequential", |b| b.iter(|| sequential.rank(black_box(&paths))));
    group.finish();
}

criterion_group!(benches, benchmark_search);
criterion_main!(benches);
