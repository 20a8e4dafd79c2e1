//! Pollard-rho factorization of the 64-bit `pq` challenge.

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn step(x: u64, c: u64, n: u64) -> u64 {
    ((mul_mod(x, x, n) as u128 + c as u128) % n as u128) as u64
}

/// One rho walk (Floyd cycle detection) with polynomial `x^2 + c`.
fn rho(n: u64, c: u64) -> Option<u64> {
    let mut tortoise = 2u64;
    let mut hare = 2u64;
    loop {
        tortoise = step(tortoise, c, n);
        hare = step(step(hare, c, n), c, n);
        let d = gcd(tortoise.abs_diff(hare), n);
        if d == n {
            return None;
        }
        if d > 1 {
            return Some(d);
        }
    }
}

/// Split `pq` into `(p, q)` with `p <= q`.
///
/// Returns `None` for values below 4 and for primes (every walk cycles).
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 {
        return None;
    }
    if pq % 2 == 0 {
        return Some((2, pq / 2));
    }
    (1..64u64)
        .find_map(|c| rho(pq, c))
        .map(|d| {
            let other = pq / d;
            (d.min(other), d.max(other))
        })
}
