//! Page geometry: bounding boxes and affine transformations

use lopdf::Object;

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from millimeters
    pub fn from_mm(mm: f64) -> Self {
        Length(mm)
    }

    /// Create a length from inches
    pub fn from_inches(inches: f64) -> Self {
        Length(inches * 25.4)
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f32 {
        (self.0 * 72.0 / 25.4) as f32
    }
}

/// A rectangle in default user space (points), as used for MediaBox
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl Rect {
    /// Build a rectangle from any two opposite corners
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            llx: x0.min(x1),
            lly: y0.min(y1),
            urx: x0.max(x1),
            ury: y0.max(y1),
        }
    }

    /// Rectangle anchored at the origin
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// US Letter size (8.5" × 11")
    pub fn letter() -> Self {
        Self::from_size(Length::from_mm(215.9).pt(), Length::from_mm(279.4).pt())
    }

    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self::from_size(Length::from_mm(210.0).pt(), Length::from_mm(297.0).pt())
    }

    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Parse a PDF rectangle array `[x0 y0 x1 y1]`
    pub fn from_pdf_array(array: &[Object]) -> Option<Self> {
        if array.len() != 4 {
            return None;
        }
        let mut nums = [0.0f32; 4];
        for (slot, value) in nums.iter_mut().zip(array) {
            *slot = value.as_float().ok()?;
        }
        Some(Self::new(nums[0], nums[1], nums[2], nums[3]))
    }

    /// Render as a PDF rectangle array
    pub fn to_pdf_array(&self) -> Object {
        Object::Array(vec![
            number(self.llx),
            number(self.lly),
            number(self.urx),
            number(self.ury),
        ])
    }
}

/// Represents a PDF transformation matrix [a b c d e f]
/// where: x' = a*x + c*y + e, y' = b*x + d*y + f
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    /// Identity matrix (no transformation)
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, e: 0.0, f: 0.0 }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: tx, f: ty }
    }

    pub fn rotate_degrees(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// Apply `self` first, then `next`
    pub fn then(&self, next: &Matrix) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    /// Calculate the inverse of this transformation matrix
    ///
    /// Returns `None` for a singular matrix.
    pub fn inverse(&self) -> Option<Self> {
        // | a  c  e |
        // | b  d  f |
        // | 0  0  1 |
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-10 {
            return None;
        }

        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    /// Check if this is (approximately) the identity matrix
    pub fn is_identity(&self) -> bool {
        (self.a - 1.0).abs() < 0.001
            && self.b.abs() < 0.001
            && self.c.abs() < 0.001
            && (self.d - 1.0).abs() < 0.001
            && self.e.abs() < 0.001
            && self.f.abs() < 0.001
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Map a rectangle and return the bounding box of the result
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.llx, rect.lly),
            self.apply(rect.urx, rect.lly),
            self.apply(rect.llx, rect.ury),
            self.apply(rect.urx, rect.ury),
        ];
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for (x, y) in &corners[1..] {
            x0 = x0.min(*x);
            y0 = y0.min(*y);
            x1 = x1.max(*x);
            y1 = y1.max(*y);
        }
        Rect::new(x0, y0, x1, y1)
    }

    /// Operands for a `cm` operator
    pub fn to_operands(&self) -> Vec<Object> {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .into_iter()
            .map(number)
            .collect()
    }
}

/// Integral values are written as integers to keep streams compact
fn number(value: f32) -> Object {
    if value.fract() == 0.0 && value.abs() < i32::MAX as f32 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_length_conversions() {
        let len = Length::from_inches(1.0);
        assert!((len.mm() - 25.4).abs() < 0.01);
        assert!(approx(len.pt(), 72.0));
    }

    #[test]
    fn test_letter_size() {
        let letter = Rect::letter();
        assert!(approx(letter.width(), 612.0));
        assert!(approx(letter.height(), 792.0));
    }

    #[test]
    fn test_rect_normalises_corners() {
        let rect = Rect::new(100.0, 50.0, 0.0, 0.0);
        assert_eq!(rect, Rect::from_size(100.0, 50.0));
    }

    #[test]
    fn test_rect_from_pdf_array() {
        let array = vec![0.into(), 0.into(), Object::Real(595.5), 842.into()];
        let rect = Rect::from_pdf_array(&array).unwrap();
        assert!(approx(rect.width(), 595.5));
        assert!(approx(rect.height(), 842.0));

        assert!(Rect::from_pdf_array(&array[..3]).is_none());
        let bad = vec![0.into(), 0.into(), Object::Name(b"X".to_vec()), 1.into()];
        assert!(Rect::from_pdf_array(&bad).is_none());
    }

    #[test]
    fn test_scale_then_translate() {
        let m = Matrix::scale(2.0, 3.0).then(&Matrix::translate(10.0, 20.0));
        assert_eq!(m.apply(1.0, 1.0), (12.0, 23.0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Matrix::scale(2.0, 4.0).then(&Matrix::translate(5.0, -3.0));
        let back = m.then(&m.inverse().unwrap());
        assert!(back.is_identity());
        assert!(Matrix::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_apply_rect_rotation() {
        let rect = Rect::from_size(10.0, 20.0);
        let rotated = Matrix::rotate_degrees(90.0).apply_rect(&rect);
        assert!(approx(rotated.width(), 20.0));
        assert!(approx(rotated.height(), 10.0));
    }

    #[test]
    fn test_operands_prefer_integers() {
        let ops = Matrix::scale(2.0, 0.5).to_operands();
        assert!(matches!(ops[0], Object::Integer(2)));
        assert!(matches!(ops[3], Object::Real(v) if v == 0.5));
    }
}
