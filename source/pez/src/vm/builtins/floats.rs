use crate::{
    vm::{DefKind, Pending},
    word::{Cell, CELL},
    Error, Pez,
};

use super::flag;

impl<T: 'static> Pez<T> {
    #[inline]
    fn float_pop2(&mut self) -> Result<(f64, f64), Error> {
        let b = self.float_stack.try_pop()?;
        let a = self.float_stack.try_pop()?;
        Ok((a, b))
    }

    #[inline]
    fn float_binop(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), Error> {
        let (a, b) = self.float_pop2()?;
        self.float_stack.push(f(a, b))?;
        Ok(())
    }

    #[inline]
    fn float_unop(&mut self, f: impl FnOnce(f64) -> f64) -> Result<(), Error> {
        let a = self.float_stack.try_pop()?;
        self.float_stack.push(f(a))?;
        Ok(())
    }

    // Comparisons take floats and leave an integer flag.
    #[inline]
    fn float_cmp(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<(), Error> {
        let (a, b) = self.float_pop2()?;
        self.data_stack.push(flag(f(a, b)))?;
        Ok(())
    }

    pub fn float_add(&mut self) -> Result<(), Error> {
        self.float_binop(|a, b| a + b)
    }

    pub fn float_minus(&mut self) -> Result<(), Error> {
        self.float_binop(|a, b| a - b)
    }

    pub fn float_mul(&mut self) -> Result<(), Error> {
        self.float_binop(|a, b| a * b)
    }

    pub fn float_div(&mut self) -> Result<(), Error> {
        let (a, b) = self.float_pop2()?;
        if b == 0.0 {
            return Err(Error::DivideByZero);
        }
        self.float_stack.push(a / b)?;
        Ok(())
    }

    pub fn float_modu(&mut self) -> Result<(), Error> {
        let (a, b) = self.float_pop2()?;
        if b == 0.0 {
            return Err(Error::DivideByZero);
        }
        self.float_stack.push(a % b)?;
        Ok(())
    }

    pub fn float_negate(&mut self) -> Result<(), Error> {
        self.float_unop(|a| -a)
    }

    pub fn float_abs(&mut self) -> Result<(), Error> {
        self.float_unop(f64::abs)
    }

    pub fn float_min(&mut self) -> Result<(), Error> {
        self.float_binop(f64::min)
    }

    pub fn float_max(&mut self) -> Result<(), Error> {
        self.float_binop(f64::max)
    }

    pub fn float_equal(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a == b)
    }

    pub fn float_not_equal(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a != b)
    }

    pub fn float_less(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a < b)
    }

    pub fn float_greater(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a > b)
    }

    pub fn float_less_equal(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a <= b)
    }

    pub fn float_greater_equal(&mut self) -> Result<(), Error> {
        self.float_cmp(|a, b| a >= b)
    }

    pub fn float_pop_print(&mut self) -> Result<(), Error> {
        let a = self.float_stack.try_pop()?;
        self.print(&format!("{a} "))
    }

    pub fn float_dup(&mut self) -> Result<(), Error> {
        let a = self.float_stack.try_peek()?;
        self.float_stack.push(a)?;
        Ok(())
    }

    pub fn float_drop(&mut self) -> Result<(), Error> {
        let _a = self.float_stack.try_pop()?;
        Ok(())
    }

    pub fn float_swap(&mut self) -> Result<(), Error> {
        let (a, b) = self.float_pop2()?;
        self.float_stack.push(b)?;
        self.float_stack.push(a)?;
        Ok(())
    }

    pub fn float_over(&mut self) -> Result<(), Error> {
        let a = self.float_stack.try_peek_back_n(1)?;
        self.float_stack.push(a)?;
        Ok(())
    }

    /// ( n -- ) ( F: -- r )
    pub fn float_from_int(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        self.float_stack.push(a as f64)?;
        Ok(())
    }

    /// ( F: r -- ) ( -- n ), truncating toward zero.
    pub fn float_fix(&mut self) -> Result<(), Error> {
        let a = self.float_stack.try_pop()?;
        self.data_stack.push(a as Cell)?;
        Ok(())
    }

    pub fn float_sqrt(&mut self) -> Result<(), Error> {
        self.float_unop(f64::sqrt)
    }

    pub fn float_sin(&mut self) -> Result<(), Error> {
        self.float_unop(f64::sin)
    }

    pub fn float_cos(&mut self) -> Result<(), Error> {
        self.float_unop(f64::cos)
    }

    pub fn float_tan(&mut self) -> Result<(), Error> {
        self.float_unop(f64::tan)
    }

    pub fn float_atan(&mut self) -> Result<(), Error> {
        self.float_unop(f64::atan)
    }

    /// ( F: y x -- r )
    pub fn float_atan2(&mut self) -> Result<(), Error> {
        self.float_binop(f64::atan2)
    }

    pub fn float_exp(&mut self) -> Result<(), Error> {
        self.float_unop(f64::exp)
    }

    pub fn float_log(&mut self) -> Result<(), Error> {
        self.float_unop(f64::ln)
    }

    pub fn float_pow(&mut self) -> Result<(), Error> {
        self.float_binop(f64::powf)
    }

    pub fn float_load(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let addr = self.addr(addr, CELL)?;
        let val = self.heap.fetch_float(addr)?;
        self.float_stack.push(val)?;
        Ok(())
    }

    /// ( addr -- ) ( F: r -- )
    pub fn float_store(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let addr = self.addr(addr, CELL)?;
        let val = self.float_stack.try_pop()?;
        self.heap.store_float(addr, val)?;
        Ok(())
    }

    pub fn fconstant(&mut self) -> Result<(), Error> {
        let value = self.float_stack.try_pop()?;
        self.with_next_token(Pending::Define(DefKind::FConstant(value)))
    }

    pub fn fvariable(&mut self) -> Result<(), Error> {
        self.with_next_token(Pending::Define(DefKind::FVariable))
    }

    pub fn float_print_stack(&mut self) -> Result<(), Error> {
        let depth = self.float_stack.depth();
        self.float_print_top(depth)
    }

    /// ( n -- ) Print the top `n` floats, deepest first.
    pub fn float_print_stack_n(&mut self) -> Result<(), Error> {
        let n = crate::word::cell_to_usize(self.data_stack.try_pop()?)?;
        self.float_print_top(n.min(self.float_stack.depth()))
    }

    fn float_print_top(&mut self, n: usize) -> Result<(), Error> {
        let items = self.float_stack.as_slice();
        let mut s = format!("<{}>", items.len());
        for f in &items[items.len() - n..] {
            s.push_str(&format!(" {f}"));
        }
        s.push(' ');
        self.print(&s)
    }
}
