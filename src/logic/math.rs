//! Constant-product (Uniswap V2 style) swap math on 256-bit integers.
//!
//! A "reserve path" is a flat slice `[r_in_0, r_out_0, r_in_1, r_out_1, ...]`, one
//! `(reserve_in, reserve_out)` pair per hop, already oriented for the direction of travel.
//! Intermediate products are taken at 512 bits so that normalized reserves of low-decimal
//! tokens (up to ~2^152) price without overflow.

use alloy_primitives::{U256, U512};

/// 0.3% LP fee, expressed as `997 / 1000`.
pub const FEE_NUMERATOR: u64 = 997;
pub const FEE_DENOMINATOR: u64 = 1000;

/// Coefficients of the composed virtual pool are kept below this many bits so that
/// `N * D` and the next composition always fit in 512 bits.
const COEFFICIENT_BITS: usize = 250;

/// Distance scanned around a converged optimum, where floor rounding dents the profit curve.
const ROUNDING_NEIGHBOURHOOD: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("invalid reserves: both reserves must be positive")]
    InvalidReserves,
    #[error("malformed reserve path of length {0}: expected a positive even number of reserves")]
    MalformedReservePath(usize),
    #[error("arithmetic overflow")]
    Overflow,
}

fn widen(value: U256) -> U512 {
    U512::from_limbs_slice(value.as_limbs())
}

fn narrow(value: U512) -> Result<U256, MathError> {
    U256::checked_from_limbs_slice(value.as_limbs()).ok_or(MathError::Overflow)
}

fn check_reserve_path(reserve_path: &[U256]) -> Result<(), MathError> {
    if reserve_path.is_empty() || reserve_path.len() % 2 != 0 {
        return Err(MathError::MalformedReservePath(reserve_path.len()));
    }
    if reserve_path.iter().any(|r| r.is_zero()) {
        return Err(MathError::InvalidReserves);
    }
    Ok(())
}

/// Output of a single swap after the LP fee:
/// `floor(amount_in * 997 * reserve_out / (reserve_in * 1000 + amount_in * 997))`.
pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, MathError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(MathError::InvalidReserves);
    }
    let amount_in_with_fee = widen(amount_in) * U512::from(FEE_NUMERATOR);
    let numerator = amount_in_with_fee.checked_mul(widen(reserve_out)).ok_or(MathError::Overflow)?;
    let denominator = widen(reserve_in) * U512::from(FEE_DENOMINATOR) + amount_in_with_fee;

    narrow(numerator / denominator)
}

/// Thread `amount_in` through every hop of `reserve_path`.
///
/// Returns `reserve_path.len() / 2 + 1` amounts: the input followed by each hop's output.
pub fn amounts_along_path(amount_in: U256, reserve_path: &[U256]) -> Result<Vec<U256>, MathError> {
    check_reserve_path(reserve_path)?;

    let mut amounts = Vec::with_capacity(reserve_path.len() / 2 + 1);
    amounts.push(amount_in);
    let mut amount = amount_in;
    for hop in reserve_path.chunks_exact(2) {
        amount = amount_out(amount, hop[0], hop[1])?;
        amounts.push(amount);
    }
    Ok(amounts)
}

/// Final output of [`amounts_along_path`].
pub fn amount_out_for_path(amount_in: U256, reserve_path: &[U256]) -> Result<U256, MathError> {
    check_reserve_path(reserve_path)?;

    reserve_path.chunks_exact(2).try_fold(amount_in, |amount, hop| amount_out(amount, hop[0], hop[1]))
}

/// Whether input `a` (round-tripping to `out_a`) is strictly more profitable than `b`:
/// `out_a - a > out_b - b`, compared without leaving unsigned arithmetic.
fn more_profitable(a: U256, out_a: U256, b: U256, out_b: U256) -> bool {
    out_a.saturating_add(b) > out_b.saturating_add(a)
}

/// A chain of constant-product hops folded into one virtual pool:
/// `out(x) = n * x / (d + m * x)`.
#[derive(Debug, Clone, Copy)]
struct VirtualPool {
    n: U512,
    d: U512,
    m: U512,
}

impl VirtualPool {
    fn hop(reserve_in: U256, reserve_out: U256) -> Self {
        Self {
            n: widen(reserve_out) * U512::from(FEE_NUMERATOR),
            d: widen(reserve_in) * U512::from(FEE_DENOMINATOR),
            m: U512::from(FEE_NUMERATOR),
        }
        .rescaled()
    }

    /// `next(self(x))`, itself a pool of the same shape.
    fn then(self, next: VirtualPool) -> Result<Self, MathError> {
        let n = next.n.checked_mul(self.n).ok_or(MathError::Overflow)?;
        let d = next.d.checked_mul(self.d).ok_or(MathError::Overflow)?;
        let m = next
            .d
            .checked_mul(self.m)
            .zip(next.m.checked_mul(self.n))
            .and_then(|(a, b)| a.checked_add(b))
            .ok_or(MathError::Overflow)?;

        Ok(Self { n, d, m }.rescaled())
    }

    /// Shift all coefficients by the same amount; `out(x)` is homogeneous in them.
    fn rescaled(self) -> Self {
        let bits = self.n.bit_len().max(self.d.bit_len()).max(self.m.bit_len());
        if bits <= COEFFICIENT_BITS {
            return self;
        }
        let shift = bits - COEFFICIENT_BITS;
        Self { n: self.n >> shift, d: self.d >> shift, m: (self.m >> shift).max(U512::from(1u64)) }
    }

    /// Maximiser of `out(x) - x`: `(sqrt(n * d) - d) / m`, zero when the marginal rate at zero is <= 1.
    fn optimal_input(&self) -> Result<U256, MathError> {
        let product = self.n.checked_mul(self.d).ok_or(MathError::Overflow)?;
        let root = isqrt(product);
        if root <= self.d {
            return Ok(U256::ZERO);
        }
        narrow((root - self.d) / self.m)
    }
}

/// Floor square root by Newton's iteration.
fn isqrt(n: U512) -> U512 {
    if n < U512::from(2u64) {
        return n;
    }
    let mut x = U512::from(1u64) << n.bit_len().div_ceil(2);
    loop {
        let y = (x + n / x) >> 1usize;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Input amount maximising `amount_out_for_path(x) - x` over a cycle of constant-product pools.
///
/// The closed-form maximiser of the composed virtual pool is refined against the exact,
/// floor-rounded hop-by-hop profit. No input within 16 wei of the result is more profitable.
/// On reserves of a few million wei or less, rounding can still leave a better input further
/// out. Returns zero when no input is profitable; callers still need to check the profit.
pub fn optimal_amount_in(reserve_path: &[U256]) -> Result<U256, MathError> {
    check_reserve_path(reserve_path)?;

    let mut hops = reserve_path.chunks_exact(2);
    let mut pool = match hops.next() {
        Some(hop) => VirtualPool::hop(hop[0], hop[1]),
        None => return Err(MathError::MalformedReservePath(0)),
    };
    for hop in hops {
        pool = pool.then(VirtualPool::hop(hop[0], hop[1]))?;
    }

    let estimate = pool.optimal_input()?;
    if estimate.is_zero() {
        return Ok(U256::ZERO);
    }
    refine(estimate, reserve_path)
}

/// Path output for `x`, or `None` when `x` is too large to price.
fn evaluate(x: U256, reserve_path: &[U256]) -> Result<Option<U256>, MathError> {
    match amount_out_for_path(x, reserve_path) {
        Ok(out) => Ok(Some(out)),
        Err(MathError::Overflow) => Ok(None),
        Err(e) => Err(e),
    }
}

/// `x ± step`, whichever is more profitable than `x`, if either is.
fn better_neighbour(x: U256, out: U256, step: U256, reserve_path: &[U256]) -> Result<Option<(U256, U256)>, MathError> {
    if let Some(up) = x.checked_add(step) {
        if let Some(up_out) = evaluate(up, reserve_path)? {
            if more_profitable(up, up_out, x, out) {
                return Ok(Some((up, up_out)));
            }
        }
    }
    if x >= step {
        let down = x - step;
        if let Some(down_out) = evaluate(down, reserve_path)? {
            if more_profitable(down, down_out, x, out) {
                return Ok(Some((down, down_out)));
            }
        }
    }
    Ok(None)
}

/// Hill-climb on the integer profit, starting around `x / 2^20`. The step doubles after a
/// move and halves after a miss, down to single wei. Every move strictly raises the profit,
/// so the climb terminates.
fn refine(estimate: U256, reserve_path: &[U256]) -> Result<U256, MathError> {
    let mut x = estimate;
    let mut out = amount_out_for_path(x, reserve_path)?;
    let mut step = (x >> 20usize).max(U256::from(1u64));

    loop {
        while !step.is_zero() {
            match better_neighbour(x, out, step, reserve_path)? {
                Some((next, next_out)) => {
                    (x, out) = (next, next_out);
                    step = step.saturating_mul(U256::from(2u64));
                }
                None => step >>= 1usize,
            }
        }

        let mut moved = false;
        for delta in 2..=ROUNDING_NEIGHBOURHOOD {
            if let Some((next, next_out)) = better_neighbour(x, out, U256::from(delta), reserve_path)? {
                (x, out) = (next, next_out);
                moved = true;
                break;
            }
        }
        if !moved {
            return Ok(x);
        }
        step = U256::from(1u64);
    }
}
