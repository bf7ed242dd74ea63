use std::iter;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Random alphanumeric string of `size` characters.
pub fn random_str(size: usize) -> String {
    let mut rng = thread_rng();
    iter::repeat(())
        .map(|()| rng.sample(Alphanumeric))
        .map(char::from)
        .take(size)
        .collect()
}
