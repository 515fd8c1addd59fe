/// 灰度显示窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
pub struct GrayWindow {
    level: f32,
    width: f32,
}

impl GrayWindow {
    /// 构建显示窗.
    ///
    /// `level` 和 `width` 必须有限且 `width` 为正, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<GrayWindow> {
        if level.is_finite() && width.is_finite() && 0.0 < width {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个将 `[min, max]` 线性映射到 `[0, 255]` 的窗口.
    ///
    /// 若 `max <= min` (例如常数切片), 则窗口下限为 `min`, 所有不超过 `min` 的值都映射为黑色.
    /// 若边界非有限, 则返回 `None`.
    pub fn from_range(min: f32, max: f32) -> Option<GrayWindow> {
        if max > min {
            Self::new((min + max) / 2.0, max - min)
        } else {
            Self::new(min + 0.5, 1.0)
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前窗设置下, `v` 对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if v <= lb {
            Some(0.0)
        } else if v >= self.upper_bound() {
            Some(255.0)
        } else {
            // 255, not 256.
            Some((v - lb) / self.width() * 255.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::GrayWindow;

    fn is_valid_init(level: f32, width: f32) -> bool {
        GrayWindow::new(level, width).is_some()
    }

    #[test]
    fn test_gray_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(!is_valid_init(f32::NAN, 1.0));
        assert!(GrayWindow::from_range(f32::NEG_INFINITY, 1.0).is_none());
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_gray_window_range() {
        // [60, 100]
        let win = GrayWindow::from_range(60.0, 100.0).unwrap();
        assert!(float_eq(win.level(), 80.0));
        assert!(float_eq(win.width(), 40.0));
        assert_eq!(win.eval_f32(f32::NAN), None);
        assert_eq!(win.eval_f32(f32::MIN), Some(0.0));
        assert_eq!(win.eval_f32(f32::MAX), Some(255.0));

        assert_eq!(win.eval_f32(60.0), Some(0.0));
        assert!(float_eq(win.eval_f32(70.0).unwrap(), 255.0 * 0.25));
        assert!(float_eq(win.eval_f32(80.0).unwrap(), 255.0 * 0.5));
        assert!(win.eval_f32(99.999).unwrap() < 255.0);
        assert_eq!(win.eval_f32(100.0), Some(255.0));
    }

    /// 常数切片全部映射为黑色.
    #[test]
    fn test_gray_window_constant() {
        let win = GrayWindow::from_range(3.0, 3.0).unwrap();
        assert_eq!(win.eval_f32(3.0), Some(0.0));
        assert_eq!(win.eval_f32(2.0), Some(0.0));
    }
}
