//! 余弦相似度

/// 余弦相似度；任一向量全零、为空、含 NaN 或维度不一致时返回 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let score = dot / (norm_a * norm_b);
    if norm_a == 0.0 || norm_b == 0.0 || score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}
