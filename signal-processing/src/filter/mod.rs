pub mod exponential;

pub trait Filter {
    fn update(&mut self, sample: f32) -> Option<f32>;
    fn clear(&mut self);
}
