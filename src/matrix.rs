//! Dense matrices over word-sized unsigned integers, with wrapping
//! arithmetic. The LWE modulus is the full machine word (2^32 or 2^64), so
//! every operation is ordinary two's-complement arithmetic.

use std::fmt::Debug;

use rand::Rng;

/// Element type of the outer PIR scheme: u32 or u64.
pub trait Elem:
    Copy + Clone + Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    const BITS: usize;

    /// Truncating conversion from a u64.
    fn from_u64(v: u64) -> Self;
    /// Wrapping two's-complement conversion from a signed value.
    fn from_i64(v: i64) -> Self;
    fn to_u64(self) -> u64;

    fn wrapping_add(self, other: Self) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
    fn wrapping_mul(self, other: Self) -> Self;
    fn rem(self, m: Self) -> Self;
}

impl Elem for u32 {
    const BITS: usize = 32;

    fn from_u64(v: u64) -> Self {
        v as u32
    }
    fn from_i64(v: i64) -> Self {
        v as u32
    }
    fn to_u64(self) -> u64 {
        self as u64
    }
    fn wrapping_add(self, other: Self) -> Self {
        u32::wrapping_add(self, other)
    }
    fn wrapping_sub(self, other: Self) -> Self {
        u32::wrapping_sub(self, other)
    }
    fn wrapping_mul(self, other: Self) -> Self {
        u32::wrapping_mul(self, other)
    }
    fn rem(self, m: Self) -> Self {
        self % m
    }
}

impl Elem for u64 {
    const BITS: usize = 64;

    fn from_u64(v: u64) -> Self {
        v
    }
    fn from_i64(v: i64) -> Self {
        v as u64
    }
    fn to_u64(self) -> u64 {
        self
    }
    fn wrapping_add(self, other: Self) -> Self {
        u64::wrapping_add(self, other)
    }
    fn wrapping_sub(self, other: Self) -> Self {
        u64::wrapping_sub(self, other)
    }
    fn wrapping_mul(self, other: Self) -> Self {
        u64::wrapping_mul(self, other)
    }
    fn rem(self, m: Self) -> Self {
        self % m
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix<T: Elem> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Elem> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    /// Uniformly random entries in `[0, modulus)`; `modulus == 0` means the
    /// full element width.
    pub fn random<R: Rng>(rng: &mut R, rows: usize, cols: usize, modulus: u64) -> Self {
        let mut out = Self::zeros(rows, cols);
        for v in out.data.iter_mut() {
            let raw = rng.gen::<u64>();
            *v = if modulus == 0 {
                T::from_u64(raw)
            } else {
                T::from_u64(raw % modulus)
            };
        }
        out
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> T {
        assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: T) {
        assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = v;
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn add(&mut self, other: &Matrix<T>) {
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_add(*b);
        }
    }

    pub fn sub(&mut self, other: &Matrix<T>) {
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_sub(*b);
        }
    }

    pub fn mul_const(&mut self, k: T) {
        for a in self.data.iter_mut() {
            *a = a.wrapping_mul(k);
        }
    }

    pub fn mod_const(&mut self, m: T) {
        for a in self.data.iter_mut() {
            *a = a.rem(m);
        }
    }

    /// Wrapping matrix product.
    pub fn mul(a: &Matrix<T>, b: &Matrix<T>) -> Matrix<T> {
        assert_eq!(a.cols, b.rows);
        let mut out: Matrix<T> = Matrix::zeros(a.rows, b.cols);
        for i in 0..a.rows {
            for k in 0..a.cols {
                let v = a.data[i * a.cols + k];
                if v == T::default() {
                    continue;
                }
                for j in 0..b.cols {
                    let idx = i * b.cols + j;
                    out.data[idx] = out.data[idx].wrapping_add(v.wrapping_mul(b.data[k * b.cols + j]));
                }
            }
        }
        out
    }

    pub fn drop_last_rows(&mut self, k: usize) {
        assert!(k <= self.rows);
        self.rows -= k;
        self.data.truncate(self.rows * self.cols);
    }
}

impl Matrix<u64> {
    /// Narrow each entry to 32 bits.
    pub fn make32(&self) -> Matrix<u32> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| v as u32).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_add_sub() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let a = Matrix::<u64>::random(&mut rng, 4, 3, 0);
        let b = Matrix::<u64>::random(&mut rng, 4, 3, 0);
        let mut c = a.clone();
        c.add(&b);
        c.sub(&b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_mul_wrapping() {
        let mut a = Matrix::<u32>::zeros(1, 2);
        a.set(0, 0, u32::MAX);
        a.set(0, 1, 2);
        let mut b = Matrix::<u32>::zeros(2, 1);
        b.set(0, 0, 2);
        b.set(1, 0, 3);
        let c = Matrix::mul(&a, &b);
        assert_eq!(c.get(0, 0), u32::MAX.wrapping_mul(2).wrapping_add(6));
    }

    #[test]
    fn test_mul_const_mod_const() {
        let mut m = Matrix::<u64>::zeros(2, 1);
        m.set(0, 0, 5);
        m.set(1, 0, 9);
        m.mul_const(1 << 60);
        assert_eq!(m.get(0, 0), 5u64.wrapping_mul(1 << 60));
        m.mod_const(1 << 60);
        assert_eq!(m.get(0, 0), 0);
    }

    #[test]
    fn test_make32_drop_last_rows() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let a = Matrix::<u64>::random(&mut rng, 5, 1, 0);
        let mut b = a.make32();
        assert_eq!(b.get(4, 0) as u64, a.get(4, 0) & 0xffff_ffff);
        b.drop_last_rows(2);
        assert_eq!(b.rows(), 3);
        assert_eq!(b.get(2, 0) as u64, a.get(2, 0) & 0xffff_ffff);
    }
}
